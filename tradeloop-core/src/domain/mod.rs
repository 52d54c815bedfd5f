//! Domain types for the tradeloop engine.

pub mod candle;
pub mod ids;
pub mod order;
pub mod trade;

pub use candle::Candle;
pub use ids::{OrderId, TradeId};
pub use order::{Order, OrderError, OrderSide, OrderStatus};
pub use trade::{Direction, Trade};

/// Pair symbol type alias (e.g. "BTC/USDT").
pub type Pair = String;
