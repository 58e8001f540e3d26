use creator_pilot::error::CreatorPilotError;
use creator_pilot::goals::{GoalPatch, GoalStatus, GoalStore, GoalType, NewGoal};
use creator_pilot::youtube::ChannelSnapshot;
use tempfile::tempdir;

fn goal(title: &str, goal_type: GoalType, target_value: f64) -> NewGoal {
    NewGoal {
        title: title.to_string(),
        goal_type,
        target_value,
        current_value: None,
        target_date: None,
    }
}

async fn store() -> (tempfile::TempDir, GoalStore) {
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("goals.db");
    let store = GoalStore::new(db_path.to_string_lossy()).await.unwrap();
    (temp, store)
}

#[tokio::test]
async fn reaching_the_target_completes_the_goal() {
    let (_temp, store) = store().await;
    let created = store
        .create_goal("u1", goal("1k subs", GoalType::Subscribers, 1000.0))
        .await
        .unwrap();
    assert!(!created.completed);
    assert_eq!(created.progress_percent, 0.0);

    let partial = store.update_progress("u1", created.id, 400.0).await.unwrap();
    assert_eq!(partial.progress_percent, 40.0);
    assert!(!partial.completed);

    let done = store.update_progress("u1", created.id, 1000.0).await.unwrap();
    assert!(done.completed);
    assert!(done.completed_at.is_some());
    assert_eq!(done.progress_percent, 100.0);

    // Dropping below the target again does not reopen it.
    let after = store.update_progress("u1", created.id, 900.0).await.unwrap();
    assert!(after.completed);
    assert_eq!(after.completed_at, done.completed_at);
}

#[tokio::test]
async fn lowering_the_target_can_complete_a_goal() {
    let (_temp, store) = store().await;
    let created = store
        .create_goal(
            "u1",
            NewGoal {
                current_value: Some(300.0),
                ..goal("Views", GoalType::Views, 1000.0)
            },
        )
        .await
        .unwrap();

    let updated = store
        .update_goal(
            "u1",
            created.id,
            GoalPatch {
                target_value: Some(250.0),
                ..GoalPatch::default()
            },
        )
        .await
        .unwrap();
    assert!(updated.completed);
}

#[tokio::test]
async fn status_filter_and_manual_completion() {
    let (_temp, store) = store().await;
    let a = store
        .create_goal("u1", goal("Sponsor", GoalType::Revenue, 500.0))
        .await
        .unwrap();
    store
        .create_goal("u1", goal("Views", GoalType::Views, 10_000.0))
        .await
        .unwrap();

    store.set_completed("u1", a.id, true).await.unwrap();
    assert_eq!(
        store.list_goals("u1", GoalStatus::Completed).await.unwrap().len(),
        1
    );
    assert_eq!(store.list_goals("u1", GoalStatus::Active).await.unwrap().len(), 1);
    assert_eq!(store.list_goals("u1", GoalStatus::All).await.unwrap().len(), 2);

    let reopened = store.set_completed("u1", a.id, false).await.unwrap();
    assert!(!reopened.completed);
    assert!(reopened.completed_at.is_none());
}

#[tokio::test]
async fn sync_updates_metric_goals_only() {
    let (_temp, store) = store().await;
    let subs = store
        .create_goal("u1", goal("Subs", GoalType::Subscribers, 1000.0))
        .await
        .unwrap();
    let revenue = store
        .create_goal("u1", goal("Revenue", GoalType::Revenue, 100.0))
        .await
        .unwrap();
    let engagement = store
        .create_goal("u1", goal("Engagement", GoalType::Engagement, 5.0))
        .await
        .unwrap();

    let snapshot = ChannelSnapshot {
        subscribers: Some(1200.0),
        views: Some(50_000.0),
        engagement_rate: None,
    };
    let updated = store.sync_goals("u1", &snapshot).await.unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].id, subs.id);
    assert!(updated[0].completed);
    assert!(updated[0].last_synced_at.is_some());

    let revenue = store.get_goal("u1", revenue.id).await.unwrap();
    assert_eq!(revenue.current_value, 0.0);
    assert!(revenue.last_synced_at.is_none());
    let engagement = store.get_goal("u1", engagement.id).await.unwrap();
    assert!(engagement.last_synced_at.is_none());
}

#[tokio::test]
async fn rejects_bad_input_and_other_users() {
    let (_temp, store) = store().await;
    let err = store
        .create_goal("u1", goal("Zero", GoalType::Views, 0.0))
        .await
        .unwrap_err();
    assert!(matches!(err, CreatorPilotError::Validation(_)));

    let created = store
        .create_goal("u1", goal("Views", GoalType::Views, 10.0))
        .await
        .unwrap();
    let err = store.update_progress("u1", created.id, -1.0).await.unwrap_err();
    assert!(matches!(err, CreatorPilotError::Validation(_)));

    let err = store.get_goal("u2", created.id).await.unwrap_err();
    assert!(matches!(err, CreatorPilotError::NotFound(_)));
}
