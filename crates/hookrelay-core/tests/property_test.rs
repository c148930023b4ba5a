//! Property-based tests for domain model invariants.

use std::collections::HashSet;

use hookrelay_core::{Event, EventData, EventType, RoutingTable};
use proptest::prelude::*;

proptest! {
    #[test]
    fn routing_table_resolves_exactly_its_entries(
        routes in prop::collection::hash_map("[a-z]{1,8}", "app_[a-z0-9]{4}", 0..16),
        name in "[a-z]{1,8}",
    ) {
        let table: RoutingTable = routes.clone().into_iter().collect();

        prop_assert_eq!(table.len(), routes.len());
        prop_assert_eq!(table.resolve(&name), routes.get(&name).map(String::as_str));
    }

    #[test]
    fn routing_key_ignores_surrounding_whitespace(
        padding_left in " {0,3}",
        project in "[a-z]{1,12}",
        padding_right in " {0,3}",
    ) {
        let event = Event::new(
            "evt_1",
            EventType::UserCreated,
            format!("{padding_left}{project}{padding_right}"),
            EventData::new(),
        );
        prop_assert_eq!(event.routing_key(), Some(project.as_str()));
    }

    #[test]
    fn unsupported_type_names_never_parse(name in "[a-z]{1,10}\\.[a-z]{1,10}") {
        let supported = EventType::ALL.iter().any(|event_type| event_type.as_str() == name);
        prop_assert_eq!(name.parse::<EventType>().is_ok(), supported);
    }
}

#[test]
fn every_event_type_has_a_distinct_wire_name() {
    let names: HashSet<&str> = EventType::ALL.iter().map(|event_type| event_type.as_str()).collect();
    assert_eq!(names.len(), EventType::ALL.len());
}
