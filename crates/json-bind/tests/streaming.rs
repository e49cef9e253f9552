//! Lazy decoding: top-level pull streams and in-document stream members.

use json_bind::{BindError, Binder, FieldInput, Native, RecordLayout, Replay, Spec};

#[derive(Debug, Clone, PartialEq)]
struct Point {
    x: i32,
    y: i32,
}

fn point_binder() -> Binder {
    let mut binder = Binder::new();
    binder.register_record(
        RecordLayout::new("Point")
            .value_field::<i32, _>("x", |p: &Point| p.x)
            .value_field::<i32, _>("y", |p: &Point| p.y)
            .construct(|slots| {
                Ok(Point {
                    x: slots.take("x")?,
                    y: slots.take("y")?,
                })
            }),
    );
    binder
}

#[test]
fn stream_decodes_one_element_per_next() {
    let binder = Binder::new();
    let mut stream = binder.stream::<i32>("[10, 20, 30]").unwrap();
    assert_eq!(stream.scalars_decoded(), 0);
    assert_eq!(stream.next().unwrap().unwrap(), 10);
    assert_eq!(stream.scalars_decoded(), 1);
    assert_eq!(stream.next().unwrap().unwrap(), 20);
    assert_eq!(stream.scalars_decoded(), 2);
    // Dropping here abandons the third element unread.
}

#[test]
fn stream_runs_to_completion() {
    let binder = point_binder();
    let points: Vec<Point> = binder
        .stream::<Point>(r#"[{"x":1,"y":2},{"x":3,"y":4}]"#)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        points,
        vec![Point { x: 1, y: 2 }, Point { x: 3, y: 4 }]
    );
    let mut stream = binder.stream::<Point>("[]").unwrap();
    assert!(stream.next().is_none());
    assert!(stream.next().is_none());
}

#[test]
fn stream_requires_an_array_document() {
    let binder = Binder::new();
    assert!(matches!(
        binder.stream::<i32>("42").err(),
        Some(BindError::Syntax(_))
    ));
}

#[test]
fn stream_surfaces_trailing_garbage_at_exhaustion() {
    let binder = Binder::new();
    let mut stream = binder.stream::<i32>("[1] tail").unwrap();
    assert_eq!(stream.next().unwrap().unwrap(), 1);
    assert!(matches!(stream.next(), Some(Err(BindError::Syntax(_)))));
}

fn summing_stream(limit: usize) -> Spec {
    Spec::scalar::<i64>().stream(move |iter| {
        let mut total = 0i64;
        for item in iter.take(limit) {
            let n = item?
                .downcast::<i64>()
                .map_err(|_| BindError::Protocol("stream element is not an i64"))?;
            total += *n;
        }
        Ok(Box::new(total) as Native)
    })
}

#[derive(Debug, Clone, PartialEq)]
struct Stats {
    total: i64,
    label: String,
}

fn stats_binder(limit: usize) -> Binder {
    let mut binder = Binder::new();
    binder.register_record(
        RecordLayout::new("Stats")
            .spec_field(
                "samples",
                summing_stream(limit),
                |input| match input {
                    FieldInput::Aggregate(any) => Ok(any),
                    FieldInput::Scalar(_) => {
                        Err(BindError::Protocol("samples must be an array"))
                    }
                },
                |s: &Stats| Ok(Replay::from(s.total)),
            )
            .value_field::<String, _>("label", |s: &Stats| s.label.clone())
            .construct(|slots| {
                Ok(Stats {
                    total: slots.take("samples")?,
                    label: slots.take("label")?,
                })
            }),
    );
    binder
}

#[test]
fn stream_member_aggregates_inside_a_record() {
    let binder = stats_binder(usize::MAX);
    let stats: Stats = binder
        .read(r#"{ "samples": [1, 2, 3, 4], "label": "all" }"#)
        .unwrap();
    assert_eq!(
        stats,
        Stats {
            total: 10,
            label: "all".to_string()
        }
    );
}

#[test]
fn unpulled_stream_elements_are_skipped_not_decoded() {
    // The aggregator stops after two elements; the rest of the array is
    // skipped raw and the members after it still decode.
    let binder = stats_binder(2);
    let stats: Stats = binder
        .read(r#"{ "samples": [1, 2, 95, 96, 97], "label": "first-two" }"#)
        .unwrap();
    assert_eq!(
        stats,
        Stats {
            total: 3,
            label: "first-two".to_string()
        }
    );
}
