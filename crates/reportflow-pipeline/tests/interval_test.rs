//! Property tests for interval boundary derivation.

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;
use reportflow_pipeline::{CustomDataLayers, Precedence, VariableContext};
use serde_json::{Map, Value, json};

fn instant(value: &Value) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value.as_str().unwrap())
        .unwrap()
        .with_timezone(&Utc)
}

fn layer(value: Value) -> Map<String, Value> {
    value.as_object().unwrap().clone()
}

proptest! {
    #[test]
    fn current_interval_contains_now(
        day in 0i64..366,
        millis_of_day in 0i64..86_400_000,
        minutes in 1i64..=1440,
    ) {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let now = base + TimeDelta::days(day) + TimeDelta::milliseconds(millis_of_day);

        let mut ctx = VariableContext::initialize_at(now, json!({})).unwrap();
        ctx.merge_custom_data(&layer(json!({
            "timezoneOverride": "UTC",
            "interval": format!("PT{}M", minutes),
        })))
        .unwrap();

        let interval = TimeDelta::minutes(minutes);
        let current = instant(&ctx.vars()["currentIntervalStart"]);
        let previous = instant(&ctx.vars()["previousIntervalStart"]);

        prop_assert!(current <= now);
        prop_assert!(now < current + interval);
        prop_assert_eq!(previous, current - interval);
    }

    #[test]
    fn higher_precedence_layer_wins(order in Just(vec![0usize, 1, 2, 3]).prop_shuffle()) {
        let ranks = [
            Precedence::Global,
            Precedence::Configuration,
            Precedence::Template,
            Precedence::Export,
        ];
        let mut layers = CustomDataLayers::new();
        for i in &order {
            let mut data = Map::new();
            data.insert("key".to_string(), json!(i));
            data.insert(format!("only{i}"), json!(true));
            layers.push(ranks[*i], format!("layer {i}"), &data);
        }

        let merged = layers.flatten();
        prop_assert_eq!(&merged["key"], &json!(3));
        for i in 0..4 {
            prop_assert_eq!(merged.get(&format!("only{i}")), Some(&json!(true)));
        }

        let mut ctx = VariableContext::initialize(json!({})).unwrap();
        ctx.apply_layers(&layers).unwrap();
        ctx.apply_layers(&layers).unwrap();
        prop_assert_eq!(&ctx.vars()["key"], &json!(3));
    }
}
