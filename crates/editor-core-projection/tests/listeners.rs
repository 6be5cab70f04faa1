use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use editor_core_projection::{
    ChangeKind, EventPhase, MasterDocument, ProjectionConfig, ProjectionDocument,
    ProjectionError, ProjectionEvent, Region, SafetyLimit,
};
use pretty_assertions::assert_eq;

type Log = Arc<Mutex<Vec<(EventPhase, ProjectionEvent)>>>;

fn record(doc: &mut ProjectionDocument) -> Log {
    let log: Log = Arc::default();
    let sink = log.clone();
    doc.subscribe(move |_, _, phase, event| {
        sink.lock().expect("lock").push((phase, event.clone()));
    });
    log
}

fn origins(log: &Log) -> Vec<(EventPhase, Region)> {
    log.lock()
        .expect("lock")
        .iter()
        .map(|(phase, event)| (*phase, event.origin_region()))
        .collect()
}

#[test]
fn test_range_changes_are_reported_before_and_after() {
    let master = MasterDocument::new("ABCDEFGHIJ");
    let mut doc = ProjectionDocument::new();
    let log = record(&mut doc);

    doc.add_master_range(&master, 2, 3).unwrap();
    doc.add_master_range(&master, 7, 2).unwrap();
    doc.remove_master_range(&master, 7, 2).unwrap();

    let log = log.lock().expect("lock");
    assert_eq!(log.len(), 6);
    for (i, (phase, event)) in log.iter().enumerate() {
        let expected = if i % 2 == 0 {
            EventPhase::AboutToChange
        } else {
            EventPhase::Changed
        };
        assert_eq!(*phase, expected);
        assert_eq!(event.kind, ChangeKind::ProjectionChange);
        assert!(event.master_event.is_none());
    }

    assert_eq!(log[0].1.image_region(), Region::new(0, 0));
    assert_eq!(log[0].1.text, "CDE");
    assert_eq!(log[2].1.image_region(), Region::new(3, 0));
    assert_eq!(log[2].1.text, "HI");
    assert_eq!(log[4].1.image_region(), Region::new(3, 2));
    assert_eq!(log[4].1.text, "");
    assert_eq!(log[4].1.origin_region(), Region::new(7, 2));
}

#[test]
fn test_listeners_see_the_projection_on_both_sides_of_a_change() {
    let mut master = MasterDocument::new("0123456789");
    let mut doc = ProjectionDocument::new();
    doc.add_master_range(&master, 2, 3).unwrap();
    doc.add_master_range(&master, 7, 2).unwrap();

    let texts = Arc::new(Mutex::new(Vec::new()));
    let sink = texts.clone();
    doc.subscribe(move |doc, master, phase, _| {
        sink.lock()
            .expect("lock")
            .push((phase, doc.text(), master.text()));
    });

    doc.replace_master(&mut master, 3, 0, "X").unwrap();
    assert_eq!(
        *texts.lock().expect("lock"),
        vec![
            (
                EventPhase::AboutToChange,
                "23478".to_string(),
                "012X3456789".to_string()
            ),
            (
                EventPhase::Changed,
                "2X3478".to_string(),
                "012X3456789".to_string()
            ),
        ]
    );
}

#[test]
fn test_content_change_carries_the_master_event() {
    let mut master = MasterDocument::new("0123456789");
    let mut doc = ProjectionDocument::new();
    doc.add_master_range(&master, 2, 3).unwrap();
    let log = record(&mut doc);

    doc.replace_master(&mut master, 3, 1, "xyz").unwrap();

    let log = log.lock().expect("lock");
    assert_eq!(log.len(), 2);
    let (_, event) = &log[0];
    assert_eq!(event.kind, ChangeKind::ContentChange);
    assert_eq!(event.image_region(), Region::new(1, 1));
    assert_eq!(event.text, "xyz");
    let master_event = event.master_event.as_ref().unwrap();
    assert_eq!(master_event.region(), Region::new(3, 1));
    assert_eq!(master_event.text, "xyz");
    assert_eq!(log[0].1, log[1].1);
}

#[test]
fn test_structural_changes_are_refused_during_a_content_notification() {
    let mut master = MasterDocument::new("0123456789");
    let mut doc = ProjectionDocument::new();
    doc.add_master_range(&master, 2, 3).unwrap();

    let results = Arc::new(Mutex::new(Vec::new()));
    let sink = results.clone();
    doc.subscribe(move |doc, master, phase, event| {
        if event.kind == ChangeKind::ContentChange && phase == EventPhase::AboutToChange {
            let result = doc.add_master_range(master, 0, 1);
            sink.lock().expect("lock").push(result);
        }
    });

    doc.replace_master(&mut master, 3, 0, "X").unwrap();
    assert_eq!(
        *results.lock().expect("lock"),
        vec![Err(ProjectionError::ChangeInProgress)]
    );
    assert_eq!(doc.text(), "2X34");
    assert!(!doc.is_broken());
}

/// Every before-notification is followed by an after-notification for the same change.
fn assert_paired(log: &Log) {
    let log = log.lock().expect("lock");
    let befores = log
        .iter()
        .filter(|(phase, _)| *phase == EventPhase::AboutToChange)
        .count();
    assert_eq!(befores * 2, log.len(), "{log:?}");
    for pair in log.chunks(2) {
        assert_eq!(pair[0].0, EventPhase::AboutToChange);
        assert_eq!(pair[1].0, EventPhase::Changed);
        assert_eq!(pair[0].1, pair[1].1);
    }
}

#[test]
fn test_a_range_added_from_a_listener_follows_the_announced_one() {
    let master = MasterDocument::new("ABCDEFGHIJ");
    let mut doc = ProjectionDocument::new();

    let acted = Arc::new(AtomicBool::new(false));
    let depth = Arc::new(AtomicUsize::new(0));
    let max_depth = Arc::new(AtomicUsize::new(0));
    {
        let (acted, depth, max_depth) = (acted.clone(), depth.clone(), max_depth.clone());
        doc.subscribe(move |doc, master, phase, _| {
            let current = depth.fetch_add(1, Ordering::SeqCst) + 1;
            max_depth.fetch_max(current, Ordering::SeqCst);
            if phase == EventPhase::AboutToChange && !acted.swap(true, Ordering::SeqCst) {
                assert_eq!(doc.text(), "");
                doc.add_master_range(master, 6, 3).unwrap();
                // The announced change was applied first.
                assert_eq!(doc.text(), "CDEGHI");
            }
            depth.fetch_sub(1, Ordering::SeqCst);
        });
    }
    let log = record(&mut doc);

    doc.add_master_range(&master, 2, 3).unwrap();
    assert_eq!(doc.text(), "CDEGHI");
    assert_eq!(doc.fragments(), vec![Region::new(2, 3), Region::new(6, 3)]);
    assert_eq!(max_depth.load(Ordering::SeqCst), 1);

    assert_eq!(
        origins(&log),
        vec![
            (EventPhase::AboutToChange, Region::new(2, 3)),
            (EventPhase::Changed, Region::new(2, 3)),
            (EventPhase::AboutToChange, Region::new(6, 3)),
            (EventPhase::Changed, Region::new(6, 3)),
        ]
    );
    assert_paired(&log);
}

#[test]
fn test_a_range_removed_from_a_listener_keeps_notifications_paired() {
    let master = MasterDocument::new("ABCDEFGHIJ");
    let mut doc = ProjectionDocument::new();
    doc.add_master_range(&master, 2, 7).unwrap();

    let acted = Arc::new(AtomicBool::new(false));
    let results = Arc::new(Mutex::new(Vec::new()));
    {
        let (acted, sink) = (acted.clone(), results.clone());
        doc.subscribe(move |doc, master, phase, _| {
            if phase == EventPhase::AboutToChange && !acted.swap(true, Ordering::SeqCst) {
                let result = doc.remove_master_range(master, 4, 1);
                sink.lock().expect("lock").push(result);
            }
        });
    }
    let log = record(&mut doc);

    doc.remove_master_range(&master, 3, 3).unwrap();
    assert_eq!(doc.text(), "CGHI");
    assert_eq!(doc.fragments(), vec![Region::new(2, 1), Region::new(6, 3)]);

    // The announced removal already took [4, 5) out of the projection.
    assert_eq!(
        *results.lock().expect("lock"),
        vec![Err(ProjectionError::NotProjected {
            offset: 4,
            length: 1
        })]
    );
    assert_eq!(
        origins(&log),
        vec![
            (EventPhase::AboutToChange, Region::new(3, 3)),
            (EventPhase::Changed, Region::new(3, 3)),
        ]
    );
    assert_paired(&log);
}

#[test]
fn test_listeners_never_see_a_nested_change_before_the_current_one_ends() {
    let master = MasterDocument::new("ABCDEFGHIJ");
    let mut doc = ProjectionDocument::new();
    doc.add_master_range(&master, 0, 2).unwrap();

    let acted = Arc::new(AtomicBool::new(false));
    {
        let acted = acted.clone();
        doc.subscribe(move |doc, master, phase, _| {
            if phase == EventPhase::Changed && !acted.swap(true, Ordering::SeqCst) {
                doc.remove_master_range(master, 0, 1).unwrap();
                doc.add_master_range(master, 8, 2).unwrap();
            }
        });
    }
    let first = record(&mut doc);
    let second = record(&mut doc);

    doc.add_master_range(&master, 4, 2).unwrap();
    assert_eq!(doc.text(), "BEFIJ");

    let expected = vec![
        (EventPhase::AboutToChange, Region::new(4, 2)),
        (EventPhase::Changed, Region::new(4, 2)),
        (EventPhase::AboutToChange, Region::new(0, 1)),
        (EventPhase::Changed, Region::new(0, 1)),
        (EventPhase::AboutToChange, Region::new(8, 2)),
        (EventPhase::Changed, Region::new(8, 2)),
    ];
    assert_eq!(origins(&first), expected);
    assert_eq!(origins(&second), expected);
    assert_paired(&first);
}

#[test]
fn test_a_listener_that_keeps_undoing_an_add_hits_the_safety_limit() {
    let master = MasterDocument::new("ABCDEFGHIJ");
    let config = ProjectionConfig::default().with_safety_limit(SafetyLimit {
        per_fragment: 1,
        minimum: 3,
    });
    let mut doc = ProjectionDocument::with_config(config);

    let removals = Arc::new(AtomicUsize::new(0));
    let counter = removals.clone();
    doc.subscribe(move |doc, master, phase, event| {
        if phase == EventPhase::Changed
            && event.kind == ChangeKind::ProjectionChange
            && !event.text.is_empty()
        {
            doc.remove_master_range(master, 2, 3).unwrap();
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let err = doc.add_master_range(&master, 2, 3).unwrap_err();
    assert_eq!(err, ProjectionError::SafetyLimitExceeded { limit: 3 });
    assert!(err.is_invalid_argument());
    assert_eq!(removals.load(Ordering::SeqCst), 4);
    assert!(!doc.is_broken());
    assert_eq!(doc.text(), "");
}

#[test]
fn test_disposing_from_a_listener_aborts_the_change() {
    let master = MasterDocument::new("ABCDEFGHIJ");
    let mut doc = ProjectionDocument::new();
    doc.subscribe(|doc, _, _, _| doc.dispose());

    assert_eq!(
        doc.add_master_range(&master, 2, 3),
        Err(ProjectionError::Disposed)
    );
    assert!(doc.is_disposed());
    assert!(!doc.is_broken());
    assert_eq!(doc.listener_count(), 0);
}

#[test]
fn test_unsubscribed_listeners_are_not_called() {
    let master = MasterDocument::new("ABCDEFGHIJ");
    let mut doc = ProjectionDocument::new();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let id = doc.subscribe(move |_, _, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    doc.add_master_range(&master, 0, 1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    assert!(doc.unsubscribe(id));
    assert!(!doc.unsubscribe(id));
    doc.add_master_range(&master, 5, 1).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_replacing_all_ranges_reports_one_change() {
    let master = MasterDocument::new("ABCDEFGHIJ");
    let mut doc = ProjectionDocument::new();
    doc.add_master_range(&master, 2, 3).unwrap();
    doc.add_master_range(&master, 7, 2).unwrap();
    let log = record(&mut doc);

    doc.replace_master_ranges(&master, 0, 4).unwrap();

    let log = log.lock().expect("lock");
    assert_eq!(log.len(), 2);
    let (_, event) = &log[1];
    assert_eq!(event.kind, ChangeKind::ProjectionChange);
    assert_eq!(event.image_region(), Region::new(0, 5));
    assert_eq!(event.text, "ABCD");
    assert_eq!(event.origin_region(), Region::new(0, 4));
}
