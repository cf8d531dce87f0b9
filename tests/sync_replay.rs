mod common;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use common::{setup_store, Widget};
use offline_store::{
    EntityId, SyncConfig, SyncQueue, SyncQueueItem, SyncStatus, SyncTransport, TransportError,
};

/// In-memory stand-in for the remote API. Keeps a version counter per entity
/// and can be told to reject specific entities.
#[derive(Default)]
struct FakeRemote {
    versions: Mutex<HashMap<String, i64>>,
    requests: Mutex<Vec<String>>,
    offline_for: Mutex<Vec<EntityId>>,
}

impl FakeRemote {
    fn go_offline_for(&self, id: &EntityId) {
        self.offline_for.lock().unwrap().push(id.clone());
    }

    fn come_back(&self) {
        self.offline_for.lock().unwrap().clear();
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncTransport for FakeRemote {
    async fn push(&self, item: &SyncQueueItem) -> Result<Option<i64>, TransportError> {
        self.requests.lock().unwrap().push(format!(
            "{} /{}s/{}",
            item.operation.http_method(),
            item.entity_type,
            item.entity_id
        ));
        if self.offline_for.lock().unwrap().contains(&item.entity_id) {
            return Err(anyhow::anyhow!("connection refused").into());
        }
        let mut versions = self.versions.lock().unwrap();
        let version = versions.entry(item.entity_id.to_string()).or_insert(0);
        *version += 1;
        Ok(Some(*version))
    }
}

#[tokio::test]
async fn replay_drains_queue_and_marks_entities_synced() {
    let ctx = setup_store().await;
    let first = ctx
        .widgets
        .create(Widget::new("First", &["a"]))
        .await
        .expect("create");
    let second = ctx
        .widgets
        .create(Widget::new("Second", &[]))
        .await
        .expect("create");
    ctx.widgets
        .update_with(first.id(), |w| w.name = "First v2".into())
        .await
        .expect("update");

    let remote = FakeRemote::default();
    let report = ctx.queue.replay(&remote, None).await.expect("replay");
    assert!(report.is_clean());
    assert_eq!(report.acknowledgements.len(), 3);
    assert_eq!(
        remote.requests(),
        vec![
            format!("POST /widgets/{}", first.id()),
            format!("POST /widgets/{}", second.id()),
            format!("PUT /widgets/{}", first.id()),
        ]
    );

    ctx.widgets
        .apply_replay_report(&report)
        .await
        .expect("apply report");
    // Reports are routed by entity type; customers see nothing to do.
    assert_eq!(
        ctx.customers
            .apply_replay_report(&report)
            .await
            .expect("apply report"),
        0
    );

    for widget in ctx.widgets.get_all(false).await.expect("get_all") {
        assert_eq!(widget.meta.sync_status, SyncStatus::Completed);
    }
    let first = ctx
        .widgets
        .get_by_id(first.id())
        .await
        .expect("get")
        .expect("present");
    assert_eq!(first.meta.server_version, Some(2));
    assert_eq!(first.local_version(), 2);

    assert!(ctx.queue.pending(None).await.expect("pending").is_empty());
    assert_eq!(ctx.queue.purge_completed().await.expect("purge"), 3);
}

#[tokio::test]
async fn mutation_during_replay_keeps_entity_pending() {
    let ctx = setup_store().await;
    let widget = ctx
        .widgets
        .create(Widget::new("Racing", &[]))
        .await
        .expect("create");

    let remote = FakeRemote::default();
    let report = ctx.queue.replay(&remote, None).await.expect("replay");

    // The user edits the widget before the acknowledgement is applied.
    ctx.widgets
        .update_with(widget.id(), |w| w.tags.push("late".into()))
        .await
        .expect("update");
    ctx.widgets
        .apply_replay_report(&report)
        .await
        .expect("apply report");

    let stored = ctx
        .widgets
        .get_by_id(widget.id())
        .await
        .expect("get")
        .expect("present");
    assert_eq!(stored.meta.sync_status, SyncStatus::Pending);
    assert_eq!(stored.local_version(), 2);
    assert_eq!(stored.meta.server_version, Some(1));

    let pending = ctx.queue.pending(None).await.expect("pending");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].snapshot_version(), Some(2));
}

#[tokio::test]
async fn failing_entity_retries_until_ceiling_without_blocking_others() {
    let ctx = setup_store().await;
    let queue = SyncQueue::from_config(
        ctx.storage.clone(),
        &SyncConfig {
            max_retry: 2,
            batch_size: 10,
        },
    );
    let stuck = ctx
        .widgets
        .create(Widget::new("Stuck", &[]))
        .await
        .expect("create");
    ctx.widgets
        .update_with(stuck.id(), |w| w.name = "Stuck v2".into())
        .await
        .expect("update");
    let fine = ctx
        .widgets
        .create(Widget::new("Fine", &[]))
        .await
        .expect("create");

    let remote = FakeRemote::default();
    remote.go_offline_for(stuck.id());

    let report = queue.replay(&remote, Some(10)).await.expect("first replay");
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.acknowledgements.len(), 1);
    assert_eq!(&report.acknowledgements[0].entity_id, fine.id());
    ctx.widgets
        .apply_replay_report(&report)
        .await
        .expect("apply report");
    let stored = ctx
        .widgets
        .get_by_id(stuck.id())
        .await
        .expect("get")
        .expect("present");
    // The failed snapshot is older than the stored row, so the status stays.
    assert_eq!(stored.meta.sync_status, SyncStatus::Pending);

    let report = queue.replay(&remote, Some(10)).await.expect("second replay");
    assert_eq!(report.failures.len(), 1);
    assert!(report.acknowledgements.is_empty());

    // Retries exhausted: the entity is parked until someone intervenes.
    remote.come_back();
    let report = queue.replay(&remote, Some(10)).await.expect("third replay");
    assert!(report.acknowledgements.is_empty());
    assert!(report.failures.is_empty());

    let history = queue
        .items_for_entity("widget", stuck.id())
        .await
        .expect("history");
    assert_eq!(history[0].status, SyncStatus::Failed);
    assert_eq!(history[0].retry_count, 2);
    assert!(history[0]
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("connection refused"));
    assert_eq!(history[1].status, SyncStatus::Pending);

    // Dropping the dead item releases the rest of the entity's history.
    assert!(queue.remove(history[0].id).await.expect("remove"));
    let report = queue.replay(&remote, Some(10)).await.expect("fourth replay");
    assert_eq!(report.acknowledgements.len(), 1);
    assert_eq!(report.acknowledgements[0].local_version, Some(2));
}

#[tokio::test]
async fn interrupted_replay_is_recovered() {
    let ctx = setup_store().await;
    let widget = ctx
        .widgets
        .create(Widget::new("Interrupted", &[]))
        .await
        .expect("create");

    let item = ctx.queue.pending(None).await.expect("pending").remove(0);
    assert!(ctx.queue.mark_in_progress(item.id).await.expect("claim"));
    assert!(ctx.queue.pending(None).await.expect("pending").is_empty());

    assert_eq!(ctx.queue.reset_in_progress().await.expect("reset"), 1);
    let remote = FakeRemote::default();
    let report = ctx.queue.replay(&remote, None).await.expect("replay");
    assert_eq!(report.acknowledgements.len(), 1);
    assert_eq!(&report.acknowledgements[0].entity_id, widget.id());
}
