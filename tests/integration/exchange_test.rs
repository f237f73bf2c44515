//! Integration tests for the exchange lifecycle.

mod helpers;

use invigil_core::error::{AppError, ErrorKind};
use invigil_entity::exchange::{ExchangeError, ExchangeStatus};
use invigil_entity::mail::MailTemplate;
use invigil_entity::notification::NotificationKind;
use invigil_service::Actor;
use uuid::Uuid;

#[tokio::test]
async fn test_create_locks_offered_duty() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let exam = app.exam_in("Algebra I", 72).await;
    let x = app.duty(&p1, &exam).await;

    let exchange = app
        .exchanges
        .create(&p1.actor, x.id, Some("Conference trip".into()))
        .await
        .unwrap();

    assert_eq!(exchange.status, ExchangeStatus::Open);
    assert_eq!(exchange.requester_id, p1.id());
    assert!(app.attribution(x.id).await.is_involved_in_exchange);
    assert!(app.mails().await.is_empty());
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_propose_notifies_requester() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    let exchange = app
        .exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();

    assert_eq!(exchange.status, ExchangeStatus::PendingRequesterDecision);
    assert_eq!(exchange.accepter_id, Some(p2.id()));
    assert!(app.attribution(y.id).await.is_involved_in_exchange);

    let notes = app.store.notifications_for(p1.user_id()).await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::ExchangeProposalReceived.as_str());
    assert_eq!(notes[0].data["exchange_id"], exchange.id.to_string());

    let mails = app.mails().await;
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].template, MailTemplate::ProposalReceived);
    assert_eq!(mails[0].to, p1.professor.email);
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_accept_swaps_duties() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();
    let exchange = app.exchanges.accept(&p1.actor, exchange.id).await.unwrap();

    assert_eq!(exchange.status, ExchangeStatus::Approved);
    let (x, y) = (app.attribution(x.id).await, app.attribution(y.id).await);
    assert_eq!(x.professor_id, p2.id());
    assert_eq!(y.professor_id, p1.id());
    assert!(!x.is_involved_in_exchange);
    assert!(!y.is_involved_in_exchange);

    let approved = |kind: &str| kind == NotificationKind::ExchangeApproved.as_str();
    assert!(
        app.store
            .notifications_for(p1.user_id())
            .await
            .iter()
            .any(|n| approved(&n.kind))
    );
    assert!(
        app.store
            .notifications_for(p2.user_id())
            .await
            .iter()
            .any(|n| approved(&n.kind))
    );
    let outcomes: Vec<_> = app
        .mails()
        .await
        .into_iter()
        .filter(|m| m.template == MailTemplate::ExchangeOutcome)
        .collect();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|m| m.context["outcome"] == "approved"));
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_second_proposal_with_locked_duty_changes_nothing() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let p3 = app.professor("Grace").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let z = app.duty(&p3, &app.exam_in("Compilers", 80).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;

    let first = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    let second = app.exchanges.create(&p3.actor, z.id, None).await.unwrap();
    app.exchanges
        .propose(&p2.actor, first.id, y.id)
        .await
        .unwrap();

    // Y is locked by the first exchange.
    let err = app
        .exchanges
        .propose(&p2.actor, second.id, y.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::AttributionLocked(id) if id == y.id));

    let second = app.exchange(second.id).await;
    assert_eq!(second.status, ExchangeStatus::Open);
    assert!(second.accepter_id.is_none());
    let first = app.exchange(first.id).await;
    assert_eq!(first.status, ExchangeStatus::PendingRequesterDecision);
    assert_eq!(first.accepted_attribution_id, Some(y.id));
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_refuse_releases_both_duties() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();

    let err = app.exchanges.refuse(&p2.actor, exchange.id).await.unwrap_err();
    assert!(matches!(err, ExchangeError::NotOwner(_)));

    let exchange = app.exchanges.refuse(&p1.actor, exchange.id).await.unwrap();
    assert_eq!(exchange.status, ExchangeStatus::RefusedByRequester);
    assert!(!app.attribution(x.id).await.is_involved_in_exchange);
    assert!(!app.attribution(y.id).await.is_involved_in_exchange);

    let notes = app.store.notifications_for(p2.user_id()).await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::ExchangeRefused.as_str());

    // Offering the duty again takes a fresh request.
    let again = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    assert_eq!(again.status, ExchangeStatus::Open);
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_withdraw_restores_state_after_create() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    let after_create = app.attribution(x.id).await;

    app.exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();
    let outcome = app.exchanges.withdraw(&p2.actor, exchange.id).await.unwrap();

    assert_eq!(outcome.withdrawn.status, ExchangeStatus::WithdrawnByProposer);
    let reopened = outcome.reopened.expect("request reopened");
    assert_eq!(reopened.status, ExchangeStatus::Open);
    assert_eq!(reopened.offered_attribution_id, x.id);
    assert_eq!(reopened.reopened_from, Some(exchange.id));

    let x_now = app.attribution(x.id).await;
    assert_eq!(x_now.is_involved_in_exchange, after_create.is_involved_in_exchange);
    assert_eq!(x_now.professor_id, p1.id());
    assert!(!app.attribution(y.id).await.is_involved_in_exchange);

    let mails = app.mails().await;
    assert_eq!(mails.last().map(|m| m.template), Some(MailTemplate::ProposalWithdrawn));
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_withdraw_inside_window_releases_offer() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let x_exam = app.exam_in("Algebra I", 72).await;
    let x = app.duty(&p1, &x_exam).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();
    app.store
        .set_exam_start(x_exam.id, chrono::Utc::now() + chrono::Duration::hours(5))
        .await;

    let outcome = app.exchanges.withdraw(&p2.actor, exchange.id).await.unwrap();
    assert!(outcome.reopened.is_none());
    assert!(!app.attribution(x.id).await.is_involved_in_exchange);
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_create_rejections_name_the_precondition() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let soon = app.duty(&p1, &app.exam_in("Algebra I", 10).await).await;
    let later = app.duty(&p1, &app.exam_in("Logic II", 96).await).await;

    let err = app.exchanges.create(&p1.actor, soon.id, None).await.unwrap_err();
    assert!(matches!(err, ExchangeError::TooCloseToExam { .. }));
    assert!(err.to_string().contains("Algebra I"));

    let err = app.exchanges.create(&p2.actor, later.id, None).await.unwrap_err();
    assert!(matches!(err, ExchangeError::NotOwner(_)));

    app.exchanges.create(&p1.actor, later.id, None).await.unwrap();
    let err = app.exchanges.create(&p1.actor, later.id, None).await.unwrap_err();
    assert!(matches!(err, ExchangeError::AttributionLocked(_)));
    let app_err: AppError = err.into();
    assert_eq!(app_err.kind, ErrorKind::Conflict);

    let err = app
        .exchanges
        .create(&p1.actor, Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::NotFound(_)));
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_terminal_exchange_never_reopens() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let p3 = app.professor("Grace").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;
    let z = app.duty(&p3, &app.exam_in("Compilers", 80).await).await;

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();
    app.exchanges.accept(&p1.actor, exchange.id).await.unwrap();

    for err in [
        app.exchanges.propose(&p3.actor, exchange.id, z.id).await.unwrap_err(),
        app.exchanges.accept(&p1.actor, exchange.id).await.unwrap_err(),
        app.exchanges.refuse(&p1.actor, exchange.id).await.unwrap_err(),
        app.exchanges.withdraw(&p2.actor, exchange.id).await.unwrap_err(),
    ] {
        assert!(matches!(err, ExchangeError::InvalidState { .. }), "{err}");
    }
    assert_eq!(app.exchange(exchange.id).await.status, ExchangeStatus::Approved);
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_admin_cancel_requires_admin() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;
    let admin = Actor::Admin {
        user_id: Uuid::new_v4(),
    };

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();

    let err = app
        .exchanges
        .admin_cancel(&p1.actor, exchange.id)
        .await
        .unwrap_err();
    assert!(matches!(err, ExchangeError::Forbidden(_)));

    let mails_before = app.mails().await.len();
    let cancelled = app.exchanges.admin_cancel(&admin, exchange.id).await.unwrap();
    assert_eq!(cancelled.status, ExchangeStatus::CancelledByAdmin);
    assert!(!app.attribution(x.id).await.is_involved_in_exchange);
    assert!(!app.attribution(y.id).await.is_involved_in_exchange);
    assert_eq!(app.mails().await.len(), mails_before);

    for user in [p1.user_id(), p2.user_id()] {
        assert!(
            app.store
                .notifications_for(user)
                .await
                .iter()
                .any(|n| n.kind == NotificationKind::ExchangeCancelledByAdmin.as_str())
        );
    }

    let err = app.exchanges.admin_cancel(&admin, exchange.id).await.unwrap_err();
    assert!(matches!(err, ExchangeError::InvalidState { .. }));
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_queries_respect_visibility() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let p3 = app.professor("Grace").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;
    let admin = Actor::Admin {
        user_id: Uuid::new_v4(),
    };
    let page = invigil_core::types::pagination::PageRequest::default();

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();

    assert_eq!(app.exchanges.market(&p2.actor, &page).await.unwrap().total_items, 1);
    assert_eq!(app.exchanges.market(&p1.actor, &page).await.unwrap().total_items, 0);

    app.exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();

    assert!(app.exchanges.get(&p2.actor, exchange.id).await.is_ok());
    let err = app.exchanges.get(&p3.actor, exchange.id).await.unwrap_err();
    assert!(matches!(err, ExchangeError::Forbidden(_)));
    assert!(app.exchanges.get(&admin, exchange.id).await.is_ok());

    assert_eq!(app.exchanges.history(&p2.actor, &page).await.unwrap().total_items, 1);
    assert_eq!(app.exchanges.history(&p3.actor, &page).await.unwrap().total_items, 0);

    assert!(app.exchanges.list_active(&p1.actor, &page).await.is_err());
    assert_eq!(app.exchanges.list_active(&admin, &page).await.unwrap().total_items, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_proposals_admit_exactly_one() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let p3 = app.professor("Grace").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;
    let z = app.duty(&p3, &app.exam_in("Compilers", 80).await).await;

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    let exchange_id = exchange.id;

    let tasks = [(p2.actor, y.id), (p3.actor, z.id)].map(|(actor, duty)| {
        let exchanges = app.exchanges.clone();
        tokio::spawn(async move { exchanges.propose(&actor, exchange_id, duty).await })
    });
    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(
        matches!(loser, ExchangeError::InvalidState { action: "propose", .. }),
        "{loser}"
    );

    let stored = app.exchange(exchange.id).await;
    assert_eq!(stored.status, ExchangeStatus::PendingRequesterDecision);
    assert_eq!(stored.accepter_id, winners[0].accepter_id);
    assert_eq!(app.mails().await.len(), 1);
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_every_queued_mail_renders() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let p3 = app.professor("Grace").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y = app.duty(&p2, &app.exam_in("Logic II", 96).await).await;
    let z = app.duty(&p3, &app.exam_in("Compilers", 80).await).await;

    // Propose then refuse.
    let refused = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.exchanges.propose(&p2.actor, refused.id, y.id).await.unwrap();
    app.exchanges.refuse(&p1.actor, refused.id).await.unwrap();

    // Propose then withdraw, which reopens the request.
    let withdrawn = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.exchanges.propose(&p2.actor, withdrawn.id, y.id).await.unwrap();
    let reopened = app
        .exchanges
        .withdraw(&p2.actor, withdrawn.id)
        .await
        .unwrap()
        .reopened
        .expect("request reopened");

    // Propose then accept on the reopened request.
    app.exchanges.propose(&p3.actor, reopened.id, z.id).await.unwrap();
    app.exchanges.accept(&p1.actor, reopened.id).await.unwrap();

    // Ada now holds Compilers; she offers it for Logic, which then moves
    // into the notice window.
    let expiring = app.exchanges.create(&p2.actor, y.id, None).await.unwrap();
    app.exchanges.propose(&p1.actor, expiring.id, z.id).await.unwrap();
    app.store
        .set_exam_start(y.exam_id, chrono::Utc::now() + chrono::Duration::hours(5))
        .await;
    let report = app.sweeper.run(chrono::Utc::now()).await.unwrap();
    assert_eq!(report.expired, 1);

    let mails = app.mails().await;
    let templates: Vec<MailTemplate> = mails.iter().map(|m| m.template).collect();
    for template in [
        MailTemplate::ProposalReceived,
        MailTemplate::ExchangeOutcome,
        MailTemplate::ProposalWithdrawn,
        MailTemplate::AutoCancelled,
    ] {
        assert!(templates.contains(&template), "no {template:?} mail queued");
    }
    for mail in &mails {
        let rendered = invigil_service::mail::render(mail)
            .unwrap_or_else(|e| panic!("{:?} mail failed to render: {e}", mail.template));
        assert_eq!(rendered.to, mail.to);
        assert!(rendered.body.contains("http"), "{:?} mail has no link", mail.template);
    }
}
