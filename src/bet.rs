//! The `Bet` record and the closed wire enums that frame it.

use chrono::NaiveDate;

/// One lottery entry. Immutable once decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub agency: u8,
    pub first_name: String,
    pub last_name: String,
    pub document: u32,
    pub birthdate: NaiveDate,
    pub number: u16,
}

impl Bet {
    pub fn is_winner(&self, lottery_winner_number: u16) -> bool {
        self.number == lottery_winner_number
    }
}

/// Request message codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCode {
    Bet,
    EndBetting,
    RequestWinners,
}

impl MessageCode {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MessageCode::Bet),
            1 => Some(MessageCode::EndBetting),
            2 => Some(MessageCode::RequestWinners),
            _ => None,
        }
    }
}

/// Response status codes. `LotteryNotDone` and `Abort` are reserved but
/// never emitted: the draw always blocks until it can answer authoritatively
/// instead of telling a caller to come back later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResponseStatus {
    Ok = 0,
    Error = 1,
    BadRequest = 2,
    #[allow(dead_code)]
    Abort = 3,
    #[allow(dead_code)]
    LotteryNotDone = 4,
    SendWinners = 5,
    NoMoreBetsAllowed = 6,
}
