//! Integration tests for the expiry sweep.

mod helpers;

use chrono::{Duration, Utc};

use invigil_entity::exchange::ExchangeStatus;
use invigil_entity::mail::MailTemplate;
use invigil_entity::notification::NotificationKind;

#[tokio::test]
async fn test_sweep_cancels_request_whose_exam_moved_closer() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let exam = app.exam_in("Algebra I", 72).await;
    let x = app.duty(&p1, &exam).await;
    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();

    app.store
        .set_exam_start(exam.id, Utc::now() + Duration::hours(10))
        .await;
    let report = app.sweeper.run(Utc::now()).await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.expired, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(
        app.exchange(exchange.id).await.status,
        ExchangeStatus::CancelledAutoExpired
    );
    assert!(!app.attribution(x.id).await.is_involved_in_exchange);

    let notes = app.store.notifications_for(p1.user_id()).await;
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::ExchangeAutoExpired.as_str());

    let mails = app.mails().await;
    assert_eq!(mails.len(), 1);
    assert_eq!(mails[0].template, MailTemplate::AutoCancelled);
    assert_eq!(mails[0].to, p1.professor.email);
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_second_sweep_is_a_no_op() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let exam = app.exam_in("Algebra I", 72).await;
    let x = app.duty(&p1, &exam).await;
    app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.store
        .set_exam_start(exam.id, Utc::now() + Duration::hours(10))
        .await;

    app.sweeper.run(Utc::now()).await.unwrap();
    let report = app.sweeper.run(Utc::now()).await.unwrap();

    assert_eq!(report.candidates, 0);
    assert_eq!(report.expired, 0);
    assert_eq!(app.store.notifications_for(p1.user_id()).await.len(), 1);
    assert_eq!(app.mails().await.len(), 1);
}

#[tokio::test]
async fn test_sweep_leaves_distant_exchanges_alone() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();

    let report = app.sweeper.run(Utc::now()).await.unwrap();

    assert_eq!(report, invigil_service::SweepReport::default());
    assert_eq!(app.exchange(exchange.id).await.status, ExchangeStatus::Open);
    assert!(app.attribution(x.id).await.is_involved_in_exchange);
}

#[tokio::test]
async fn test_sweep_expires_pending_exchange_on_accepted_exam() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let x = app.duty(&p1, &app.exam_in("Algebra I", 72).await).await;
    let y_exam = app.exam_in("Logic II", 96).await;
    let y = app.duty(&p2, &y_exam).await;

    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.exchanges
        .propose(&p2.actor, exchange.id, y.id)
        .await
        .unwrap();
    app.store
        .set_exam_start(y_exam.id, Utc::now() + Duration::hours(3))
        .await;

    let report = app.sweeper.run(Utc::now()).await.unwrap();

    assert_eq!(report.expired, 1);
    assert!(!app.attribution(x.id).await.is_involved_in_exchange);
    assert!(!app.attribution(y.id).await.is_involved_in_exchange);
    // Duties stay with their holders.
    assert_eq!(app.attribution(x.id).await.professor_id, p1.id());
    assert_eq!(app.attribution(y.id).await.professor_id, p2.id());

    let auto_cancelled: Vec<_> = app
        .mails()
        .await
        .into_iter()
        .filter(|m| m.template == MailTemplate::AutoCancelled)
        .map(|m| m.to)
        .collect();
    assert_eq!(auto_cancelled.len(), 2);
    assert!(auto_cancelled.contains(&p1.professor.email));
    assert!(auto_cancelled.contains(&p2.professor.email));
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_one_failing_exchange_does_not_block_the_sweep() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let p2 = app.professor("Alan").await;
    let p3 = app.professor("Grace").await;

    let mut exchanges = Vec::new();
    for holder in [&p1, &p2, &p3] {
        let exam = app.exam_in("Databases", 72).await;
        let duty = app.duty(holder, &exam).await;
        let exchange = app
            .exchanges
            .create(&holder.actor, duty.id, None)
            .await
            .unwrap();
        app.store
            .set_exam_start(exam.id, Utc::now() + Duration::hours(2))
            .await;
        exchanges.push((exchange, duty));
    }
    let (broken, broken_duty) = &exchanges[1];
    app.store.fail_writes_for(broken.id).await;

    let report = app.sweeper.run(Utc::now()).await.unwrap();

    assert_eq!(report.candidates, 3);
    assert_eq!(report.expired, 2);
    assert_eq!(report.failed, 1);

    // The failed unit of work left no trace.
    assert_eq!(app.exchange(broken.id).await.status, ExchangeStatus::Open);
    assert!(app.attribution(broken_duty.id).await.is_involved_in_exchange);
    assert!(app.store.notifications_for(p2.user_id()).await.is_empty());
    for (exchange, _) in [&exchanges[0], &exchanges[2]] {
        assert_eq!(
            app.exchange(exchange.id).await.status,
            ExchangeStatus::CancelledAutoExpired
        );
    }
    app.assert_locks_match_active_exchanges().await;
}

#[tokio::test]
async fn test_dry_run_lists_candidates_without_writing() {
    let app = helpers::TestApp::new();
    let p1 = app.professor("Ada").await;
    let exam = app.exam_in("Algebra I", 72).await;
    let x = app.duty(&p1, &exam).await;
    let exchange = app.exchanges.create(&p1.actor, x.id, None).await.unwrap();
    app.store
        .set_exam_start(exam.id, Utc::now() + Duration::hours(1))
        .await;

    let ids = app.sweeper.candidates(Utc::now()).await.unwrap();

    assert_eq!(ids, vec![exchange.id]);
    assert_eq!(app.exchange(exchange.id).await.status, ExchangeStatus::Open);
    assert!(app.mails().await.is_empty());
}
