//! Tests for the epoll/eventfd primitives.

use super::*;
use std::net::UdpSocket;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn loopback_pair() -> (UdpSocket, UdpSocket) {
    let a = UdpSocket::bind("127.0.0.1:0").unwrap();
    let b = UdpSocket::bind("127.0.0.1:0").unwrap();
    (a, b)
}

#[test]
fn test_wait_reports_readable_socket() {
    let (rx, tx) = loopback_pair();
    let poller = Poller::new("test").unwrap();
    poller.add(rx.as_raw_fd(), Trigger::Level).unwrap();

    tx.send_to(b"hello", rx.local_addr().unwrap()).unwrap();

    let ready = poller.wait_timeout(Some(Duration::from_secs(2))).unwrap();
    assert_eq!(ready, Readiness::Readable(rx.as_raw_fd()));
}

#[test]
fn test_wait_times_out_when_nothing_is_ready() {
    let (rx, _tx) = loopback_pair();
    let poller = Poller::new("idle").unwrap();
    poller.add(rx.as_raw_fd(), Trigger::Edge).unwrap();

    let start = Instant::now();
    let ready = poller.wait_timeout(Some(Duration::from_millis(50))).unwrap();
    assert_eq!(ready, Readiness::Idle);
    assert!(start.elapsed() >= Duration::from_millis(40));
}

#[test]
fn test_empty_poller_waits_for_timeout() {
    let poller = Poller::new("empty").unwrap();
    let ready = poller.wait_timeout(Some(Duration::from_millis(20))).unwrap();
    assert_eq!(ready, Readiness::Idle);
    assert!(poller.watched().is_empty());
}

#[test]
fn test_sub_millisecond_timeout_still_blocks() {
    assert_eq!(poller::timeout_millis(None), -1);
    assert_eq!(poller::timeout_millis(Some(Duration::ZERO)), 0);
    assert_eq!(poller::timeout_millis(Some(Duration::from_micros(100))), 1);
    assert_eq!(poller::timeout_millis(Some(Duration::from_micros(1500))), 2);
    assert_eq!(poller::timeout_millis(Some(Duration::MAX)), i32::MAX);

    let poller = Poller::new("short").unwrap();
    let start = Instant::now();
    let ready = poller.wait_timeout(Some(Duration::from_micros(100))).unwrap();
    assert_eq!(ready, Readiness::Idle);
    assert!(start.elapsed() >= Duration::from_micros(100));
}

#[test]
fn test_removed_descriptor_is_not_reported() {
    let (rx, tx) = loopback_pair();
    let poller = Poller::new("remove").unwrap();
    poller.add(rx.as_raw_fd(), Trigger::Level).unwrap();
    poller.remove(rx.as_raw_fd()).unwrap();
    assert!(poller.watched().is_empty());

    tx.send_to(b"late", rx.local_addr().unwrap()).unwrap();
    let ready = poller.wait_timeout(Some(Duration::from_millis(50))).unwrap();
    assert_eq!(ready, Readiness::Idle);
}

#[test]
fn test_double_registration_fails() {
    let (rx, _tx) = loopback_pair();
    let poller = Poller::new("dup").unwrap();
    poller.add(rx.as_raw_fd(), Trigger::Level).unwrap();
    assert!(poller.add(rx.as_raw_fd(), Trigger::Level).is_err());
}

#[test]
fn test_hung_up_descriptor_is_dropped_from_watch_set() {
    let mut fds = [0; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let read_end = unsafe { OwnedFd::from_raw_fd(fds[0]) };
    let write_end = unsafe { OwnedFd::from_raw_fd(fds[1]) };

    let poller = Poller::new("hangup").unwrap();
    poller.add(read_end.as_raw_fd(), Trigger::Level).unwrap();
    drop(write_end);

    let ready = poller.wait_timeout(Some(Duration::from_secs(1))).unwrap();
    assert_eq!(ready, Readiness::Closed(read_end.as_raw_fd()));
    assert!(poller.watched().is_empty());
}

#[test]
fn test_notifier_wakes_poller_from_another_thread() {
    let poller = Poller::new("wake").unwrap();
    let stop = Arc::new(Notifier::new(0, NotifierFlags::SEMAPHORE).unwrap());
    poller.add(stop.as_raw_fd(), Trigger::Level).unwrap();

    let remote = Arc::clone(&stop);
    let waker = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        remote.notify(STOP_SIGNAL).unwrap();
    });

    let ready = poller.wait().unwrap();
    assert_eq!(ready, Readiness::Readable(stop.as_raw_fd()));
    assert!(stop.wait(STOP_SIGNAL).unwrap());
    waker.join().unwrap();
}

#[test]
fn test_semaphore_reads_one_at_a_time() {
    let notifier = Notifier::new(0, NotifierFlags { semaphore: true, nonblocking: true }).unwrap();
    notifier.notify(3).unwrap();

    assert_eq!(notifier.read().unwrap(), 1);
    assert_eq!(notifier.read().unwrap(), 1);
    assert_eq!(notifier.read().unwrap(), 1);
    let err = notifier.read().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::WouldBlock);
}

#[test]
fn test_counter_mode_reads_accumulated_value() {
    let notifier = Notifier::new(2, NotifierFlags::default()).unwrap();
    notifier.notify(5).unwrap();
    assert_eq!(notifier.read().unwrap(), 7);
}

#[test]
fn test_wait_compares_against_expected_value() {
    let notifier = Notifier::new(0, NotifierFlags::default()).unwrap();
    notifier.notify(2).unwrap();
    assert!(!notifier.wait(STOP_SIGNAL).unwrap());

    notifier.notify(STOP_SIGNAL).unwrap();
    assert!(notifier.wait(STOP_SIGNAL).unwrap());
}
