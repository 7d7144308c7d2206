// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use std::collections::VecDeque;

use crate::core::marker::Marker;
use crate::core::media_type::InputSample;

/// One entry of the pending work queue.
#[derive(Debug)]
pub(crate) enum WorkItem {
    Sample(InputSample),
    Marker(Marker),
}

/// FIFO of samples and markers awaiting a drain pass.
///
/// Markers and samples share one queue so a marker never completes ahead
/// of a sample queued before it.
#[derive(Debug, Default)]
pub(crate) struct WorkQueue {
    items: VecDeque<WorkItem>,
}

impl WorkQueue {
    pub(crate) fn push_back(&mut self, item: WorkItem) {
        self.items.push_back(item);
    }

    /// Put an item back at the head, ahead of everything else.
    pub(crate) fn push_front(&mut self, item: WorkItem) {
        self.items.push_front(item);
    }

    pub(crate) fn pop_front(&mut self) -> Option<WorkItem> {
        self.items.pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::marker::MarkerType;
    use serde_json::json;

    fn marker(n: i64) -> WorkItem {
        WorkItem::Marker(Marker::new(MarkerType::Tick, json!(null), json!(n)))
    }

    fn context(item: Option<WorkItem>) -> serde_json::Value {
        match item {
            Some(WorkItem::Marker(m)) => m.context,
            other => panic!("expected marker, got {:?}", other),
        }
    }

    #[test]
    fn test_fifo_with_front_requeue() {
        let mut queue = WorkQueue::default();
        queue.push_back(marker(1));
        queue.push_back(marker(2));
        queue.push_front(marker(0));
        assert_eq!(queue.len(), 3);

        assert_eq!(context(queue.pop_front()), json!(0));
        assert_eq!(context(queue.pop_front()), json!(1));
        assert_eq!(context(queue.pop_front()), json!(2));
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_clear() {
        let mut queue = WorkQueue::default();
        queue.push_back(marker(1));
        queue.clear();
        assert_eq!(queue.len(), 0);
    }
}
