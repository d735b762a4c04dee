// Subject contract for one gateway instance

/// Computes every subject the gateway listens on or publishes to.
///
/// Layout: `<prefix>.<instance>.<intent|status|event>.<topic>[.<ticker id>]`.
/// Inbound intents carry commands toward the registry; outbound statuses and
/// events mirror the registry's callbacks.
#[derive(Debug, Clone)]
pub struct ServiceSubjects {
    prefix: String,
    instance: String,
}

impl ServiceSubjects {
    pub fn new(prefix: &str, instance: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            instance: token(instance),
        }
    }

    /// Inbound ticker configuration commands (JSON `TickerUpdate`).
    pub fn intent_configuration(&self) -> String {
        format!("{}.{}.intent.configuration", self.prefix, self.instance)
    }

    /// Inbound cancellation commands (JSON `CancelCommand`).
    pub fn intent_cancel(&self) -> String {
        format!("{}.{}.intent.cancel", self.prefix, self.instance)
    }

    /// Outbound configuration snapshot for one ticker; an empty payload on
    /// this subject announces the ticker's removal.
    pub fn status_configuration(&self, id: &str) -> String {
        format!(
            "{}.{}.status.configuration.{}",
            self.prefix,
            self.instance,
            token(id)
        )
    }

    /// Outbound tick events for one ticker.
    pub fn event_tick(&self, id: &str) -> String {
        format!("{}.{}.event.tick.{}", self.prefix, self.instance, token(id))
    }

    /// Outbound heartbeat carrying the gateway's wall-clock time.
    pub fn status_unix_epoch(&self) -> String {
        format!("{}.{}.status.unix-epoch", self.prefix, self.instance)
    }
}

/// Make an arbitrary ticker id safe to embed as one NATS subject token.
fn token(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_whitespace() || matches!(c, '.' | '*' | '>') {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_layout() {
        let subjects = ServiceSubjects::new("tickway", "plant-a");
        assert_eq!(
            subjects.intent_configuration(),
            "tickway.plant-a.intent.configuration"
        );
        assert_eq!(subjects.intent_cancel(), "tickway.plant-a.intent.cancel");
        assert_eq!(
            subjects.status_configuration("boiler"),
            "tickway.plant-a.status.configuration.boiler"
        );
        assert_eq!(
            subjects.event_tick("boiler"),
            "tickway.plant-a.event.tick.boiler"
        );
        assert_eq!(
            subjects.status_unix_epoch(),
            "tickway.plant-a.status.unix-epoch"
        );
    }

    #[test]
    fn test_reserved_characters_are_sanitized() {
        let subjects = ServiceSubjects::new("tickway", "plant-a");
        assert_eq!(
            subjects.event_tick("room 1.sensor>*"),
            "tickway.plant-a.event.tick.room_1_sensor__"
        );
    }
}
