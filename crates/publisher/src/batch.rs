//! Batch queue: pending publishes waiting for a size or timer flush

use std::sync::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use contracts::{BatchItem, EventName};

use crate::lock;
use crate::publisher::PublishReceipt;
use crate::PublishError;

pub(crate) type Reply = oneshot::Sender<Result<PublishReceipt, PublishError>>;

pub(crate) struct PendingPublish {
    pub event: EventName,
    pub item: BatchItem,
    pub retry: bool,
    pub max_retries: Option<u32>,
    pub reply: Reply,
}

/// Items of one event name, in publish order
pub(crate) struct BatchGroup {
    pub event: EventName,
    pub members: Vec<PendingPublish>,
}

#[derive(Default)]
struct BatchState {
    items: Vec<PendingPublish>,
    timer: Option<JoinHandle<()>>,
}

/// What the caller must do after enqueueing
pub(crate) enum EnqueueAction {
    /// First item of a window: start the timer
    StartTimer,
    /// Queue reached the batch size: flush now
    Flush,
    Wait,
}

#[derive(Default)]
pub(crate) struct BatchQueue {
    state: Mutex<BatchState>,
}

impl BatchQueue {
    pub(crate) fn push(&self, pending: PendingPublish, batch_size: usize) -> EnqueueAction {
        let mut state = lock(&self.state);
        state.items.push(pending);

        if state.items.len() >= batch_size {
            EnqueueAction::Flush
        } else if state.timer.is_none() {
            EnqueueAction::StartTimer
        } else {
            EnqueueAction::Wait
        }
    }

    /// Install the timer of the current window. A timer that lost the race
    /// against a flush is aborted right away.
    pub(crate) fn set_timer(&self, timer: JoinHandle<()>) {
        let mut state = lock(&self.state);
        if state.items.is_empty() || state.timer.is_some() {
            timer.abort();
        } else {
            state.timer = Some(timer);
        }
    }

    /// Atomically take the queued items grouped by event name
    /// (first-appearance order) and clear the timer slot.
    ///
    /// `from_timer` is set when the timer task itself flushes; its handle is
    /// only released, not aborted.
    pub(crate) fn take_groups(&self, from_timer: bool) -> Vec<BatchGroup> {
        let (items, timer) = {
            let mut state = lock(&self.state);
            (std::mem::take(&mut state.items), state.timer.take())
        };
        if let Some(timer) = timer {
            if !from_timer {
                timer.abort();
            }
        }

        let mut groups: Vec<BatchGroup> = Vec::new();
        for pending in items {
            match groups.iter_mut().find(|g| g.event == pending.event) {
                Some(group) => group.members.push(pending),
                None => groups.push(BatchGroup {
                    event: pending.event.clone(),
                    members: vec![pending],
                }),
            }
        }
        groups
    }

    /// Drop everything queued; waiting callers receive `Cancelled`.
    pub(crate) fn cancel_all(&self) -> usize {
        let groups = self.take_groups(false);
        let mut dropped = 0;
        for group in groups {
            for pending in group.members {
                dropped += 1;
                let _ = pending
                    .reply
                    .send(Err(PublishError::cancelled(group.event.as_str())));
            }
        }
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.state).items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};
    use uuid::Uuid;

    fn pending(event: &str, n: i64) -> (PendingPublish, oneshot::Receiver<Result<PublishReceipt, PublishError>>) {
        let (reply, rx) = oneshot::channel();
        let pending = PendingPublish {
            event: EventName::new(event),
            item: BatchItem {
                id: Uuid::new_v4(),
                data: json!(n),
                metadata: Map::new(),
            },
            retry: false,
            max_retries: None,
            reply,
        };
        (pending, rx)
    }

    #[test]
    fn test_groups_keep_first_appearance_order() {
        let queue = BatchQueue::default();
        let mut receivers = Vec::new();
        for (event, n) in [("b", 1), ("a", 2), ("b", 3), ("a", 4), ("c", 5)] {
            let (p, rx) = pending(event, n);
            receivers.push(rx);
            queue.push(p, 100);
        }

        let groups = queue.take_groups(false);
        let shape: Vec<(String, Vec<serde_json::Value>)> = groups
            .iter()
            .map(|g| {
                (
                    g.event.to_string(),
                    g.members.iter().map(|m| m.item.data.clone()).collect(),
                )
            })
            .collect();

        assert_eq!(
            shape,
            vec![
                ("b".to_string(), vec![json!(1), json!(3)]),
                ("a".to_string(), vec![json!(2), json!(4)]),
                ("c".to_string(), vec![json!(5)]),
            ]
        );
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_push_reports_flush_at_batch_size() {
        let queue = BatchQueue::default();
        let (a, _ra) = pending("e", 1);
        let (b, _rb) = pending("e", 2);

        assert!(matches!(queue.push(a, 2), EnqueueAction::StartTimer));
        assert!(matches!(queue.push(b, 2), EnqueueAction::Flush));
    }

    #[test]
    fn test_cancel_all_replies_cancelled() {
        let queue = BatchQueue::default();
        let (p, mut rx) = pending("e", 1);
        queue.push(p, 10);

        assert_eq!(queue.cancel_all(), 1);
        assert_eq!(
            rx.try_recv().unwrap(),
            Err(PublishError::cancelled("e"))
        );
    }
}
