use creator_pilot::cards::{CardFilter, CardPatch, CardStatus, CardStore, NewCard, Pillar};
use creator_pilot::error::CreatorPilotError;
use tempfile::tempdir;

fn card(title: &str) -> NewCard {
    NewCard {
        title: title.to_string(),
        ..NewCard::default()
    }
}

async fn store() -> (tempfile::TempDir, CardStore) {
    let temp = tempdir().unwrap();
    let db_path = temp.path().join("cards.db");
    let store = CardStore::new(db_path.to_string_lossy()).await.unwrap();
    (temp, store)
}

#[tokio::test]
async fn new_cards_land_at_the_end_of_ideas() {
    let (_temp, store) = store().await;
    let first = store.create_card("u1", card("Studio tour")).await.unwrap();
    let second = store.create_card("u1", card("Q&A")).await.unwrap();

    assert_eq!(first.status, CardStatus::Ideas);
    assert_eq!(first.order_index, 0);
    assert_eq!(second.order_index, 1);
    assert_eq!(first.progress, 0);
    assert!(!first.archived);
}

#[tokio::test]
async fn moving_keeps_both_columns_densely_ordered() {
    let (_temp, store) = store().await;
    let a = store.create_card("u1", card("A")).await.unwrap();
    let b = store.create_card("u1", card("B")).await.unwrap();
    let c = store.create_card("u1", card("C")).await.unwrap();
    let d = store
        .create_card(
            "u1",
            NewCard {
                status: Some(CardStatus::Planning),
                ..card("D")
            },
        )
        .await
        .unwrap();

    let moved = store
        .move_card("u1", b.id, CardStatus::Planning, Some(0))
        .await
        .unwrap();
    assert_eq!(moved.status, CardStatus::Planning);
    assert_eq!(moved.order_index, 0);

    let ideas = store
        .list_cards(
            "u1",
            CardFilter {
                status: Some(CardStatus::Ideas),
                include_archived: false,
            },
        )
        .await
        .unwrap();
    let ideas: Vec<(i32, i32)> = ideas.iter().map(|c| (c.id, c.order_index)).collect();
    assert_eq!(ideas, vec![(a.id, 0), (c.id, 1)]);

    let planning = store
        .list_cards(
            "u1",
            CardFilter {
                status: Some(CardStatus::Planning),
                include_archived: false,
            },
        )
        .await
        .unwrap();
    let planning: Vec<(i32, i32)> = planning.iter().map(|c| (c.id, c.order_index)).collect();
    assert_eq!(planning, vec![(b.id, 0), (d.id, 1)]);
}

#[tokio::test]
async fn reorder_puts_listed_cards_first() {
    let (_temp, store) = store().await;
    let a = store.create_card("u1", card("A")).await.unwrap();
    let b = store.create_card("u1", card("B")).await.unwrap();
    let c = store.create_card("u1", card("C")).await.unwrap();

    let column = store
        .reorder_column("u1", CardStatus::Ideas, &[c.id])
        .await
        .unwrap();
    let ids: Vec<i32> = column.iter().map(|card| card.id).collect();
    assert_eq!(ids, vec![c.id, a.id, b.id]);

    let err = store
        .reorder_column("u1", CardStatus::Ready, &[a.id])
        .await
        .unwrap_err();
    assert!(matches!(err, CreatorPilotError::Validation(_)));
}

#[tokio::test]
async fn archive_hides_cards_until_restored() {
    let (_temp, store) = store().await;
    let a = store.create_card("u1", card("A")).await.unwrap();
    store.create_card("u1", card("B")).await.unwrap();

    let archived = store.archive_card("u1", a.id).await.unwrap();
    assert!(archived.archived);
    let visible = store.list_cards("u1", CardFilter::default()).await.unwrap();
    assert_eq!(visible.len(), 1);
    let board = store.board("u1").await.unwrap();
    assert_eq!(board.len(), 4);
    assert_eq!(board[0].cards.len(), 1);

    let err = store
        .move_card("u1", a.id, CardStatus::Ready, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CreatorPilotError::Validation(_)));

    let restored = store.restore_card("u1", a.id).await.unwrap();
    assert!(!restored.archived);
    let visible = store.list_cards("u1", CardFilter::default()).await.unwrap();
    assert_eq!(visible.len(), 2);
}

#[tokio::test]
async fn cards_are_scoped_per_user() {
    let (_temp, store) = store().await;
    let a = store.create_card("u1", card("Mine")).await.unwrap();

    let err = store.get_card("u2", a.id).await.unwrap_err();
    assert!(matches!(err, CreatorPilotError::NotFound(_)));
    assert!(store
        .list_cards("u2", CardFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn patch_updates_fields_and_changes_feed_sees_it() {
    let (_temp, store) = store().await;
    let a = store.create_card("u1", card("Draft")).await.unwrap();

    let updated = store
        .update_card(
            "u1",
            a.id,
            CardPatch {
                title: Some("Final title".to_string()),
                progress: Some(60),
                pillars: Some(vec![Pillar {
                    id: String::new(),
                    name: "Tutorials".to_string(),
                    color: None,
                }]),
                due_date: Some("2026-11-03".to_string()),
                ..CardPatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Final title");
    assert_eq!(updated.progress, 60);
    assert_eq!(updated.due_date.as_deref(), Some("2026-11-03"));
    assert_eq!(updated.pillars.len(), 1);

    let changes = store.changes_since("u1", a.created_at - 1).await.unwrap();
    assert!(changes.iter().any(|card| card.id == a.id));

    let err = store
        .update_card(
            "u1",
            a.id,
            CardPatch {
                progress: Some(101),
                ..CardPatch::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CreatorPilotError::Validation(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_and_moves_keep_columns_dense() {
    let (_temp, store) = store().await;
    let store = std::sync::Arc::new(store);

    let mut handles = Vec::new();
    for n in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let title = format!("Idea {n}");
            let created = store.create_card("u1", card(&title)).await.unwrap();
            (title, created)
        }));
    }
    let mut created = Vec::new();
    for handle in handles {
        let (title, card) = handle.await.unwrap();
        assert_eq!(card.title, title);
        created.push(card);
    }
    let mut indexes: Vec<i32> = created.iter().map(|card| card.order_index).collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..16).collect::<Vec<_>>());

    let mut handles = Vec::new();
    for card in created.iter().step_by(2) {
        let store = store.clone();
        let id = card.id;
        handles.push(tokio::spawn(async move {
            store
                .move_card("u1", id, CardStatus::Planning, Some(0))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let board = store.board("u1").await.unwrap();
    for column in &board {
        let indexes: Vec<i32> = column.cards.iter().map(|card| card.order_index).collect();
        assert_eq!(indexes, (0..column.cards.len() as i32).collect::<Vec<_>>());
    }
    assert_eq!(board[0].cards.len(), 8);
    assert_eq!(board[1].cards.len(), 8);
}

#[tokio::test]
async fn board_is_not_capped_like_lists() {
    let (_temp, store) = store().await;
    for n in 0..500 {
        store.create_card("u1", card(&format!("Idea {n}"))).await.unwrap();
    }
    for n in 0..3 {
        store
            .create_card(
                "u1",
                NewCard {
                    status: Some(CardStatus::Ready),
                    ..card(&format!("Ready {n}"))
                },
            )
            .await
            .unwrap();
    }

    let board = store.board("u1").await.unwrap();
    assert_eq!(board[0].cards.len(), 500);
    assert_eq!(board[3].cards.len(), 3);

    let listed = store.list_cards("u1", CardFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 500);
    assert!(listed.iter().all(|card| card.status == CardStatus::Ideas));
}
