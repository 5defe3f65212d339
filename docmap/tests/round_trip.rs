use std::collections::HashMap;

use docmap::{bson::oid::ObjectId, prelude::*};
use proptest::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, MappedEnum)]
enum Level {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Default, Entity)]
struct Reading {
    #[docmap(id)]
    id: Option<ObjectId>,
    sensor: String,
    #[docmap(field = "v")]
    value: f64,
    count: i64,
    active: bool,
    level: Level,
    tags: Vec<String>,
    limits: HashMap<Level, i32>,
}

fn converter() -> MappingConverter {
    let context = MappingContext::builder().register::<Reading>().unwrap().build();
    MappingConverter::builder(context).build().unwrap()
}

fn level() -> impl Strategy<Value = Level> {
    prop_oneof![Just(Level::Low), Just(Level::Medium), Just(Level::High)]
}

fn reading() -> impl Strategy<Value = Reading> {
    (
        any::<bool>(),
        "[a-z]{1,12}",
        -1.0e9..1.0e9_f64,
        any::<i64>(),
        any::<bool>(),
        level(),
        prop::collection::vec("[a-z0-9 ]{0,8}", 0..5),
        prop::collection::hash_map(level(), any::<i32>(), 0..3),
    )
        .prop_map(|(with_id, sensor, value, count, active, level, tags, limits)| Reading {
            id: with_id.then(ObjectId::new),
            sensor,
            value,
            count,
            active,
            level,
            tags,
            limits,
        })
}

proptest! {
    #[test]
    fn simple_entities_round_trip(reading in reading()) {
        let converter = converter();

        let record = converter.write_document(&Value::object(reading.clone())).unwrap();
        let back: Reading = converter.read(&record).unwrap();

        prop_assert_eq!(back, reading);
    }
}
