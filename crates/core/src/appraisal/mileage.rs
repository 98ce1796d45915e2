use std::fmt;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::cohort::Cohort;
use crate::domain::money::{format_usd, group_thousands};

pub const DEFAULT_MILEAGE_INCREMENT: i64 = 10_000;

/// Value a cohort loses for every `increment` miles driven.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MileageCost {
    pub cohort: Cohort,
    pub increment: i64,
    pub decrease: Decimal,
}

impl fmt::Display for MileageCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "For every {} additional miles this car is driven, its value will decrease by \
             approximately {}.",
            group_thousands(&self.increment.to_string()),
            format_usd(self.decrease)
        )
    }
}
