use sketchpair_system::{Color, Point, Shape, Stroke, StrokeId, StrokeLog, SyncMessage};
use std::collections::HashSet;

/// Sends a message the way the sync channel would: encoded, then decoded.
fn deliver(message: &SyncMessage, to: &mut StrokeLog) {
    let text = message.encode().expect("must encode");
    let decoded = SyncMessage::decode(&text).expect("must decode");
    to.apply(decoded);
}

fn freehand(points: usize) -> Stroke {
    Stroke::new(
        Shape::Freehand {
            points: (0..points)
                .map(|i| Point::new(i as f32 / 10.0, 0.5))
                .collect(),
        },
        Color::new(10, 20, 30),
        2.0,
    )
}

fn live_ids(log: &StrokeLog) -> HashSet<StrokeId> {
    log.history().iter().map(|s| s.id).collect()
}

#[test]
fn it_propagates_add_and_undo_to_the_other_peer() {
    let mut a = StrokeLog::new();
    let mut b = StrokeLog::new();

    let s1 = freehand(3);
    let message = a.add_local(s1.clone()).expect("fresh stroke");
    deliver(&message, &mut b);
    assert_eq!(b.history(), &[s1.clone()][..]);

    let undo = a.undo_local().expect("a has history");
    deliver(&undo, &mut b);
    assert!(b.history().is_empty());
    assert_eq!(b.redo_stack(), &[s1][..]);
}

#[test]
fn it_empties_both_peers_on_simultaneous_clear() {
    let mut a = StrokeLog::new();
    let mut b = StrokeLog::new();
    for _ in 0..2 {
        let m = a.add_local(freehand(2)).expect("fresh stroke");
        deliver(&m, &mut b);
        let m = b.add_local(freehand(4)).expect("fresh stroke");
        deliver(&m, &mut a);
    }
    b.undo_local();

    // both clear before seeing the other's clear
    let from_a = a.clear();
    let from_b = b.clear();
    deliver(&from_a, &mut b);
    deliver(&from_b, &mut a);

    for log in [&a, &b] {
        assert!(log.history().is_empty());
        assert!(log.redo_stack().is_empty());
    }
}

#[test]
fn it_converges_on_the_same_set_but_not_the_same_order() {
    let mut a = StrokeLog::new();
    let mut b = StrokeLog::new();

    // concurrent adds cross on the wire
    let from_a = a.add_local(freehand(2)).expect("fresh stroke");
    let from_b = b.add_local(freehand(3)).expect("fresh stroke");
    deliver(&from_a, &mut b);
    deliver(&from_b, &mut a);

    assert_eq!(live_ids(&a), live_ids(&b));
    assert_ne!(a.history(), b.history());
    assert_eq!(a.history()[0], b.history()[1]);
}

#[test]
fn it_tolerates_both_peers_undoing_the_same_stroke() {
    let mut a = StrokeLog::new();
    let mut b = StrokeLog::new();
    let m = a.add_local(freehand(2)).expect("fresh stroke");
    deliver(&m, &mut b);

    let undo_a = a.undo_local().expect("");
    let undo_b = b.undo_local().expect("");
    deliver(&undo_a, &mut b);
    deliver(&undo_b, &mut a);

    assert!(a.history().is_empty());
    assert!(b.history().is_empty());
    assert_eq!(a.redo_stack().len(), 1);
    assert_eq!(b.redo_stack().len(), 1);
}

#[test]
fn it_redoes_remotely_undone_strokes_as_plain_adds() {
    let mut a = StrokeLog::new();
    let mut b = StrokeLog::new();
    let s = freehand(2);
    let m = a.add_local(s.clone()).expect("fresh stroke");
    deliver(&m, &mut b);
    let m = a.undo_local().expect("");
    deliver(&m, &mut b);

    // b redoes a stroke it never authored
    let redo = b.redo_local().expect("b got the stroke on its redo stack");
    assert_eq!(redo, SyncMessage::Stroke(s.clone()));
    deliver(&redo, &mut a);

    assert_eq!(a.history(), &[s.clone()][..]);
    assert_eq!(b.history(), &[s][..]);
    // a's own redo entry for the same stroke can no longer duplicate it
    assert_eq!(a.redo_local(), None);
    assert_eq!(a.history().len(), 1);
}
