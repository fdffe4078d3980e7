use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Loyalty reward earned by one transaction; one row in `reward_events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardEvent {
    pub customer_id: String,
    pub points: i32,
    pub amount: BigDecimal,
    pub timestamp: NaiveDateTime,
}
