/// Durable topic exchange every service publishes to.
pub const TRIP_EXCHANGE: &str = "trip-exchange";

pub const FIND_AVAILABLE_DRIVERS_QUEUE: &str = "find_available_drivers";
pub const GATEWAY_NOTIFICATIONS_QUEUE: &str = "gateway_notifications";

pub mod routing_keys {
    /// Rider-side trip service announces a new trip.
    pub const TRIP_CREATED: &str = "trip.created";
    /// A driver turned an offer down. Bound for forward compatibility.
    pub const TRIP_DRIVER_DECLINED: &str = "trip.driver-declined";
    /// Dispatch command addressed to a single driver.
    pub const DRIVER_CMD_REQUEST: &str = "driver.cmd.request";
    /// Matching found nobody; addressed to the rider.
    pub const TRIP_NO_DRIVERS_FOUND: &str = "trip.no-drivers-found";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueBinding {
    pub name: String,
    pub routing_keys: Vec<String>,
}

/// Exchange plus the durable queues bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queues: Vec<QueueBinding>,
}

impl Topology {
    pub fn new(exchange: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            queues: Vec::new(),
        }
    }

    pub fn with_queue(mut self, name: &str, routing_keys: &[&str]) -> Self {
        self.queues.push(QueueBinding {
            name: name.to_string(),
            routing_keys: routing_keys.iter().map(|key| key.to_string()).collect(),
        });
        self
    }

    /// Topology shared by the trip, driver and gateway sides.
    pub fn dispatch() -> Self {
        Self::new(TRIP_EXCHANGE)
            .with_queue(
                FIND_AVAILABLE_DRIVERS_QUEUE,
                &[
                    routing_keys::TRIP_CREATED,
                    routing_keys::TRIP_DRIVER_DECLINED,
                ],
            )
            .with_queue(
                GATEWAY_NOTIFICATIONS_QUEUE,
                &[
                    routing_keys::DRIVER_CMD_REQUEST,
                    routing_keys::TRIP_NO_DRIVERS_FOUND,
                ],
            )
    }
}

/// AMQP topic matching: words are separated by `.`, `*` matches exactly one
/// word and `#` matches zero or more words.
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match (pattern.split_first(), key.split_first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some((&"#", rest)), _) => {
            match_words(rest, key) || (!key.is_empty() && match_words(pattern, &key[1..]))
        }
        (Some(_), None) => false,
        (Some((&"*", rest)), Some((_, key_rest))) => match_words(rest, key_rest),
        (Some((word, rest)), Some((candidate, key_rest))) => {
            word == candidate && match_words(rest, key_rest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{routing_keys, topic_matches, Topology, FIND_AVAILABLE_DRIVERS_QUEUE};

    #[test]
    fn exact_keys_match_only_themselves() {
        assert!(topic_matches("trip.created", "trip.created"));
        assert!(!topic_matches("trip.created", "trip.driver-declined"));
        assert!(!topic_matches("trip.created", "trip.created.extra"));
    }

    #[test]
    fn star_matches_a_single_word() {
        assert!(topic_matches("trip.*", "trip.created"));
        assert!(topic_matches("*.cmd.request", "driver.cmd.request"));
        assert!(!topic_matches("driver.*", "driver.cmd.request"));
        assert!(!topic_matches("trip.*", "trip"));
    }

    #[test]
    fn hash_matches_zero_or_more_words() {
        assert!(topic_matches("#", "trip.created"));
        assert!(topic_matches("driver.#", "driver.cmd.request"));
        assert!(topic_matches("driver.#", "driver"));
        assert!(topic_matches("#.request", "driver.cmd.request"));
        assert!(!topic_matches("rider.#", "driver.cmd.request"));
    }

    #[test]
    fn dispatch_queue_listens_for_created_and_declined_trips() {
        let topology = Topology::dispatch();
        let queue = topology
            .queues
            .iter()
            .find(|queue| queue.name == FIND_AVAILABLE_DRIVERS_QUEUE)
            .expect("dispatch queue declared");

        assert_eq!(
            queue.routing_keys,
            vec![
                routing_keys::TRIP_CREATED.to_string(),
                routing_keys::TRIP_DRIVER_DECLINED.to_string()
            ]
        );
    }
}
