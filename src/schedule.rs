use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::domain::FetchStamp;

pub const DEFAULT_REFRESH_RATE: u32 = 7;

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StalenessPolicy {
    #[default]
    Literal,
    Elapsed,
}

impl StalenessPolicy {
    pub fn is_expired(
        self,
        data_date: Option<FetchStamp>,
        refresh_rate: Option<u32>,
        now: FetchStamp,
    ) -> bool {
        match self {
            StalenessPolicy::Literal => {
                u128::from(now.as_u64()) >= expiration(data_date, refresh_rate)
            }
            StalenessPolicy::Elapsed => elapsed_expired(data_date, refresh_rate, now),
        }
    }
}

/// `data_date + 100^refresh_rate` on the `YYYYMMDDHHMMSS` integer, saturating.
/// Each step of the rate moves one field up the stamp and calendar rollover
/// is ignored. A missing date counts as 0.
pub fn expiration(data_date: Option<FetchStamp>, refresh_rate: Option<u32>) -> u128 {
    let date = data_date.map_or(0, FetchStamp::as_u64);
    let rate = refresh_rate.unwrap_or(DEFAULT_REFRESH_RATE);
    let window = 100u128.checked_pow(rate).unwrap_or(u128::MAX);
    u128::from(date).saturating_add(window)
}

pub fn refresh_window(refresh_rate: u32) -> Duration {
    let seconds = match refresh_rate {
        0 => 1,
        1 => 60,
        2 => 3_600,
        3 => SECONDS_PER_DAY,
        4 => 30 * SECONDS_PER_DAY,
        years => {
            let scale = 100i64.checked_pow(years - 5).unwrap_or(i64::MAX);
            (365 * SECONDS_PER_DAY).saturating_mul(scale)
        }
    };
    Duration::try_seconds(seconds).unwrap_or(Duration::MAX)
}

fn elapsed_expired(
    data_date: Option<FetchStamp>,
    refresh_rate: Option<u32>,
    now: FetchStamp,
) -> bool {
    let (Some(fetched), Some(now)) =
        (data_date.and_then(FetchStamp::to_datetime), now.to_datetime())
    else {
        return true;
    };
    let window = refresh_window(refresh_rate.unwrap_or(DEFAULT_REFRESH_RATE));
    now.signed_duration_since(fetched) >= window
}
