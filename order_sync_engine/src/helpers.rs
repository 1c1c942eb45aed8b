use rand::{distributions::Alphanumeric, Rng};

use crate::order_types::OrderId;

/// Generate a random identifier of the form `{prefix}-{12 alphanumeric chars}`.
pub fn random_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(12).map(char::from).collect();
    format!("{prefix}-{suffix}")
}

/// A fresh order id for an order created at checkout, before the remote store has seen it.
pub fn new_order_id() -> OrderId {
    OrderId(random_id("ord"))
}

pub fn new_notification_id() -> String {
    random_id("ntf")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn ids_carry_prefix_and_are_unique() {
        for _ in 0..100 {
            let id = new_order_id();
            assert!(id.as_str().starts_with("ord-"));
            assert_eq!(id.as_str().len(), "ord-".len() + 12);
        }
        let a = new_notification_id();
        let b = new_notification_id();
        assert_ne!(a, b);
    }
}
