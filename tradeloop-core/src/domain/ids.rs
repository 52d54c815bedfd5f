use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable integer order id, unique per engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable integer trade id, unique per engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_as_plain_integers() {
        assert_eq!(OrderId(42).to_string(), "42");
        assert_eq!(TradeId(7).to_string(), "7");
    }

    #[test]
    fn ids_serialize_transparently_enough_for_keys() {
        let json = serde_json::to_string(&OrderId(3)).unwrap();
        let back: OrderId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, OrderId(3));
    }
}
