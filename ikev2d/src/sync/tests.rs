//! Tests for the queue and table containers.

use super::*;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

mod queue_tests {
    use super::*;

    #[test]
    fn test_fifo_pops_in_arrival_order() {
        let queue = BlockingQueue::new(QueueOrder::Fifo);
        for i in 0..3 {
            assert!(queue.push(Arc::new(i)));
        }
        assert_eq!(*queue.pop().unwrap(), 0);
        assert_eq!(*queue.pop().unwrap(), 1);
        assert_eq!(*queue.pop().unwrap(), 2);
    }

    #[test]
    fn test_lifo_pops_newest_first() {
        let queue = BlockingQueue::new(QueueOrder::Lifo);
        for i in 0..3 {
            queue.push(Arc::new(i));
        }
        assert_eq!(*queue.pop().unwrap(), 2);
        assert_eq!(*queue.pop().unwrap(), 1);
        assert_eq!(*queue.pop().unwrap(), 0);
    }

    #[test]
    fn test_push_after_close_is_dropped() {
        let queue = BlockingQueue::<u32>::default();
        queue.close();
        assert!(!queue.push(Arc::new(7)));
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_close_is_idempotent() {
        let queue = BlockingQueue::<u32>::default();
        queue.close();
        queue.close();
        assert!(queue.is_closed());
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_items_pushed_before_close_are_drained() {
        let queue = BlockingQueue::new(QueueOrder::Fifo);
        queue.push(Arc::new("a"));
        queue.push(Arc::new("b"));
        queue.close();
        assert_eq!(*queue.pop().unwrap(), "a");
        assert_eq!(*queue.pop().unwrap(), "b");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_close_releases_every_blocked_consumer() {
        let queue = Arc::new(BlockingQueue::<u32>::default());
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || queue.pop())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.close();

        for consumer in consumers {
            assert!(consumer.join().unwrap().is_none());
        }
    }

    #[test]
    fn test_pop_blocks_until_push() {
        let queue = Arc::new(BlockingQueue::default());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.pop())
        };

        thread::sleep(Duration::from_millis(30));
        queue.push(Arc::new(42u32));
        assert_eq!(*consumer.join().unwrap().unwrap(), 42);
    }

    #[test]
    fn test_concurrent_producers_and_consumers_lose_nothing() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 500;

        let queue = Arc::new(BlockingQueue::new(QueueOrder::Fifo));
        let received = Arc::new(AtomicUsize::new(0));

        let consumers: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let received = Arc::clone(&received);
                thread::spawn(move || {
                    while queue.pop().is_some() {
                        received.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.push(Arc::new(p * PER_PRODUCER + i));
                    }
                })
            })
            .collect();

        for producer in producers {
            producer.join().unwrap();
        }
        while !queue.is_empty() {
            thread::sleep(Duration::from_millis(5));
        }
        queue.close();
        for consumer in consumers {
            consumer.join().unwrap();
        }

        assert_eq!(received.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);
    }

    #[test]
    fn test_queue_order_parsing() {
        assert_eq!("FIFO".parse::<QueueOrder>().unwrap(), QueueOrder::Fifo);
        assert_eq!("lifo".parse::<QueueOrder>().unwrap(), QueueOrder::Lifo);
        assert!("stack".parse::<QueueOrder>().is_err());
        assert_eq!(QueueOrder::Lifo.to_string(), "lifo");
    }
}

mod table_tests {
    use super::*;

    #[test]
    fn test_insert_find_remove() {
        let table = ConcurrentTable::new();
        assert!(table.insert("k".to_string(), Arc::new(1)).is_none());
        assert_eq!(*table.find("k").unwrap(), 1);

        let previous = table.insert("k".to_string(), Arc::new(2)).unwrap();
        assert_eq!(*previous, 1);

        assert_eq!(*table.remove("k").unwrap(), 2);
        assert!(table.find("k").is_none());
        assert!(table.remove("k").is_none());
    }

    #[test]
    fn test_find_or_insert_with_reuses_existing() {
        let table = ConcurrentTable::new();
        let (first, created) = table.find_or_insert_with("peer".to_string(), |_| 10);
        assert!(created);
        let (second, created) = table.find_or_insert_with("peer".to_string(), |_| 20);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*second, 10);
    }

    #[test]
    fn test_remove_if_same_ignores_replaced_value() {
        let table = ConcurrentTable::new();
        let (old, _) = table.find_or_insert_with("peer".to_string(), |_| 1);
        table.remove("peer");
        let (new, _) = table.find_or_insert_with("peer".to_string(), |_| 2);

        assert!(!table.remove_if_same("peer", &old));
        assert_eq!(table.len(), 1);
        assert!(table.remove_if_same("peer", &new));
        assert!(table.is_empty());
    }

    #[test]
    fn test_concurrent_find_or_create_yields_one_value() {
        const THREADS: usize = 16;

        let table = Arc::new(ConcurrentTable::<String, usize>::new());
        let created = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|i| {
                let table = Arc::clone(&table);
                let created = Arc::clone(&created);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let (value, fresh) =
                        table.find_or_insert_with("10.0.0.1-500".to_string(), |_| i);
                    if fresh {
                        created.fetch_add(1, Ordering::SeqCst);
                    }
                    Arc::as_ptr(&value) as usize
                })
            })
            .collect();

        let pointers: HashSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert_eq!(pointers.len(), 1);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_clear_reports_count() {
        let table = ConcurrentTable::new();
        for i in 0..5 {
            table.insert(i, Arc::new(i));
        }
        assert_eq!(table.keys().len(), 5);
        assert_eq!(table.clear(), 5);
        assert!(table.is_empty());
    }
}
