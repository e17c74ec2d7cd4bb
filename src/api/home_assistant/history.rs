use chrono::{DateTime, Utc};
use serde_with::serde_as;

#[must_use]
#[derive(serde::Deserialize, derive_more::IntoIterator)]
#[serde(bound(
    deserialize = "V: std::str::FromStr + serde::de::DeserializeOwned, <V as std::str::FromStr>::Err: std::fmt::Display"
))]
pub struct EntitiesHistory<V>(pub Vec<EntityHistory<V>>);

/// State changes of a single entity.
///
/// Unavailable and unknown states are skipped.
#[must_use]
#[serde_as]
#[derive(serde::Deserialize, derive_more::Index, derive_more::IntoIterator)]
#[serde(bound(
    deserialize = "V: std::str::FromStr + serde::de::DeserializeOwned, <V as std::str::FromStr>::Err: std::fmt::Display"
))]
pub struct EntityHistory<V>(#[serde_as(as = "serde_with::VecSkipError<_>")] pub Vec<State<V>>);

#[must_use]
#[serde_as]
#[derive(Copy, Clone, Debug, serde::Deserialize)]
#[serde(bound(
    deserialize = "V: std::str::FromStr + serde::de::DeserializeOwned, <V as std::str::FromStr>::Err: std::fmt::Display",
))]
pub struct State<V> {
    #[serde(rename = "last_changed")]
    pub last_changed_at: DateTime<Utc>,

    #[serde_as(as = "serde_with::DisplayFromStr")]
    #[serde(rename = "state")]
    pub value: V,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_deserialize_entities_history_ok() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            [
                [
                    {
                        "entity_id": "sensor.battery_soc",
                        "state": "unavailable",
                        "attributes": {},
                        "last_changed": "2025-06-01T11:33:07.673333+00:00",
                        "last_updated": "2025-06-01T11:33:07.673333+00:00"
                    },
                    {
                        "entity_id": "sensor.battery_soc",
                        "state": "57",
                        "attributes": {},
                        "last_changed": "2025-06-01T13:33:07+02:00",
                        "last_updated": "2025-06-01T13:33:07+02:00"
                    }
                ]
            ]
        "#;
        let history = serde_json::from_str::<EntitiesHistory<f64>>(RESPONSE)?;
        let battery_level = history.into_iter().next().unwrap();
        assert_eq!(battery_level.0.len(), 1);
        let state = &battery_level[0];
        assert_eq!(state.last_changed_at, Utc.with_ymd_and_hms(2025, 6, 1, 11, 33, 7).unwrap());
        assert_eq!(state.value, 57.0);
        Ok(())
    }

    #[test]
    fn test_deserialize_timestamp_state_ok() -> Result {
        // language=JSON
        const RESPONSE: &str = r#"
            {
                "entity_id": "sensor.sun_next_rising",
                "state": "2025-06-02T03:44:12+00:00",
                "attributes": {"device_class": "timestamp"},
                "last_changed": "2025-06-01T03:44:30.105722+00:00",
                "last_updated": "2025-06-01T03:44:30.105722+00:00"
            }
        "#;
        let state = serde_json::from_str::<State<DateTime<Utc>>>(RESPONSE)?;
        assert_eq!(state.value, Utc.with_ymd_and_hms(2025, 6, 2, 3, 44, 12).unwrap());
        Ok(())
    }
}
