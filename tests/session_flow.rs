use std::sync::mpsc;
use std::time::Duration;

use mailwatch::testing::{Call, MockConnector};
use mailwatch::types::{MailboxStatusEvent, SequenceRange};
use mailwatch::{ConfigBuilder, Error, IdleError, LoopError, Session};

const WAIT: Duration = Duration::from_secs(5);

fn session(mock: &MockConnector) -> Session {
    let config = ConfigBuilder::new("mock.example.org", "me", "hunter2").build();
    let mut session = Session::with_connector(config, mock.clone());
    session.connect().unwrap();
    session
}

fn mail(subject: &str) -> String {
    format!(
        "Subject: {}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\nbody of {}",
        subject, subject
    )
}

fn fetches(mock: &MockConnector) -> Vec<SequenceRange> {
    mock.calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::Fetch(range) => Some(range),
            _ => None,
        })
        .collect()
}

#[test]
fn new_messages_are_fetched_in_one_go() {
    let mock = MockConnector::new().with_messages(2);
    let mut session = session(&mock);
    let watch = session.wait_for_messages().unwrap();

    assert!(mock.wait_for_idle(WAIT));
    mock.append(mail("three"));
    mock.append(mail("four"));
    mock.append(mail("five"));
    mock.push_status(MailboxStatusEvent::exists(5));

    let subjects: Vec<_> = (0..3)
        .map(|_| {
            watch
                .messages()
                .recv_timeout(WAIT)
                .unwrap()
                .subject()
                .unwrap()
        })
        .collect();
    assert_eq!(subjects, vec!["three", "four", "five"]);

    watch.cancel();
    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
    assert_eq!(fetches(&mock), vec![SequenceRange::new(2, 5).unwrap()]);
    assert_eq!(session.message_count(), Some(5));
    assert!(session.is_connected());
}

#[test]
fn failed_fetch_is_retried_from_the_same_point() {
    let mock = MockConnector::new().with_messages(1);
    let mut session = session(&mock);
    mock.fail_next_fetch(Error::ConnectionLost);
    let watch = session.wait_for_messages().unwrap();

    mock.deliver(mail("two"));
    mock.deliver(mail("three"));

    let first = watch.messages().recv_timeout(WAIT).unwrap();
    let second = watch.messages().recv_timeout(WAIT).unwrap();
    assert_eq!(first.subject().unwrap(), "two");
    assert_eq!(second.subject().unwrap(), "three");

    watch.cancel();
    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
    assert_eq!(
        fetches(&mock),
        vec![
            SequenceRange::new(1, 2).unwrap(),
            SequenceRange::new(1, 3).unwrap()
        ]
    );
}

#[test]
fn same_failure_twice_ends_the_watch() {
    let mock = MockConnector::new();
    let mut session = session(&mock);
    mock.fail_next_idle(Error::ConnectionLost);
    mock.fail_next_idle(Error::ConnectionLost);

    let watch = session.wait_for_messages().unwrap();
    let err = watch.done().recv_timeout(WAIT).unwrap().unwrap_err();
    assert!(matches!(
        err.cause(),
        LoopError::Idle(IdleError::Start(Error::ConnectionLost))
    ));
    assert!(err.to_string().starts_with("unrecoverable error"));

    // The message channel closes with the watch, and the connection is gone.
    assert!(watch.messages().recv_timeout(WAIT).is_err());
    assert!(!session.is_connected());
    assert_eq!(mock.calls().last(), Some(&Call::Logout));
}

#[test]
fn different_failures_keep_the_watch_going() {
    let mock = MockConnector::new();
    let mut session = session(&mock);
    mock.fail_next_idle(Error::ConnectionLost);
    mock.fail_next_idle(Error::No("try again later".into()));
    mock.fail_next_idle_wait(Error::ConnectionLost);

    let watch = session.wait_for_messages().unwrap();
    mock.deliver(mail("after a wait failure"));
    mock.deliver(mail("delivered"));

    let message = watch.messages().recv_timeout(WAIT).unwrap();
    assert_eq!(message.subject().unwrap(), "after a wait failure");
    let message = watch.messages().recv_timeout(WAIT).unwrap();
    assert_eq!(message.subject().unwrap(), "delivered");

    watch.cancel();
    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
    assert!(session.is_connected());
}

#[test]
fn cancel_while_waiting() {
    let mock = MockConnector::new().with_messages(4);
    let mut session = session(&mock);
    let watch = session.wait_for_messages().unwrap();

    assert!(mock.wait_for_idle(WAIT));
    let canceller = watch.canceller();
    canceller.cancel();

    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
    assert!(watch.messages().recv_timeout(WAIT).is_err());
    assert!(fetches(&mock).is_empty());
    assert!(!mock.is_idling());
    assert!(session.is_connected());
    assert_eq!(session.message_count(), Some(4));
}

#[test]
fn status_without_count_keeps_waiting() {
    let mock = MockConnector::new();
    let mut session = session(&mock);
    let watch = session.wait_for_messages().unwrap();

    assert!(mock.wait_for_idle(WAIT));
    mock.push_status(MailboxStatusEvent::default());
    mock.deliver(mail("only one"));

    let message = watch.messages().recv_timeout(WAIT).unwrap();
    assert_eq!(message.subject().unwrap(), "only one");

    let calls = mock.calls();
    let first_fetch = calls
        .iter()
        .position(|c| matches!(c, Call::Fetch(_)))
        .unwrap();
    let idles = calls[..first_fetch]
        .iter()
        .filter(|c| **c == Call::Idle)
        .count();
    assert_eq!(idles, 1);

    watch.cancel();
    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
}

#[test]
fn unchanged_count_fetches_nothing() {
    let mock = MockConnector::new().with_messages(3);
    let mut session = session(&mock);
    let watch = session.wait_for_messages().unwrap();

    mock.push_status(MailboxStatusEvent::exists(3));
    mock.deliver(mail("four"));

    let message = watch.messages().recv_timeout(WAIT).unwrap();
    assert_eq!(message.subject().unwrap(), "four");
    assert_eq!(fetches(&mock), vec![SequenceRange::new(3, 4).unwrap()]);

    watch.cancel();
    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
}

#[test]
fn shrinking_count_fetches_only_new_messages() {
    let mock = MockConnector::new().with_messages(3);
    let mut session = session(&mock);
    let watch = session.wait_for_messages().unwrap();

    assert!(mock.wait_for_idle(WAIT));
    mock.push_status(MailboxStatusEvent::exists(1));
    mock.push_status(MailboxStatusEvent::exists(2));

    let message = watch.messages().recv_timeout(WAIT).unwrap();
    assert_eq!(message.subject().unwrap(), "message 2");
    assert_eq!(fetches(&mock), vec![SequenceRange::new(1, 2).unwrap()]);

    watch.cancel();
    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
    assert_eq!(session.message_count(), Some(2));
}

#[test]
fn undecodable_message_is_skipped() {
    let mock = MockConnector::new();
    let mut session = session(&mock);
    let watch = session.wait_for_messages().unwrap();

    mock.append("");
    mock.append("\tnot a header\r\n\r\n");
    mock.append(mail("readable"));
    mock.push_status(MailboxStatusEvent::exists(3));

    let message = watch.messages().recv_timeout(WAIT).unwrap();
    assert_eq!(message.subject().unwrap(), "readable");

    watch.cancel();
    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
    assert_eq!(session.message_count(), Some(3));
}

#[test]
fn dropping_the_receiver_stops_the_watch() {
    let mock = MockConnector::new();
    let mut session = session(&mock);
    let (messages, done, _canceller) = session.wait_for_messages().unwrap().into_parts();
    drop(messages);

    mock.deliver(mail("nobody reads this"));
    assert!(matches!(done.recv_timeout(WAIT), Ok(Ok(()))));
    assert!(session.is_connected());
}

#[test]
fn disconnect_while_watching() {
    let mock = MockConnector::new();
    let mut session = session(&mock);
    let watch = session.wait_for_messages().unwrap();
    assert!(mock.wait_for_idle(WAIT));

    session.disconnect();
    assert!(matches!(watch.done().recv_timeout(WAIT), Ok(Ok(()))));
    assert!(!session.is_connected());
    assert_eq!(
        mock.calls()
            .iter()
            .filter(|c| **c == Call::Logout)
            .count(),
        1
    );
}

#[test]
fn restarting_the_watch_cancels_the_old_one() {
    let mock = MockConnector::new();
    let mut session = session(&mock);
    let first = session.wait_for_messages().unwrap();
    assert!(mock.wait_for_idle(WAIT));

    let second = session.wait_for_messages().unwrap();
    assert!(matches!(first.done().recv_timeout(WAIT), Ok(Ok(()))));

    mock.deliver(mail("for the second watch"));
    let message = second.messages().recv_timeout(WAIT).unwrap();
    assert_eq!(message.subject().unwrap(), "for the second watch");

    second.cancel();
    assert!(matches!(second.done().recv_timeout(WAIT), Ok(Ok(()))));
}

#[test]
fn expunges_reach_subscribers() {
    let mock = MockConnector::new().with_messages(3);
    let session = session(&mock);

    let (tx, rx) = mpsc::sync_channel(4);
    let _subscription = session.events().subscribe_expunge::<u32>(tx);
    mock.expunge(2);
    mock.expunge(1);

    assert_eq!(rx.recv_timeout(WAIT), Ok(2));
    assert_eq!(rx.recv_timeout(WAIT), Ok(1));
}
