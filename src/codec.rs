//! Decodes one [`Bet`] from the front of a byte buffer.
//!
//! Truncated input is an explicit three-way result rather than a thrown
//! error: the caller reads more bytes only on `NeedMore`, and never wraps a
//! decode in a retry-on-panic loop.

use crate::bet::Bet;
use chrono::NaiveDate;

pub enum DecodeOutcome {
    /// A complete bet was decoded; `usize` is how many bytes of `buffer` it
    /// consumed.
    Complete(Bet, usize),
    /// `buffer` is shorter than the declared layout; read more and retry.
    NeedMore,
    /// Name/surname is not valid UTF-8, or the birthdate does not parse.
    Malformed(String),
}

const BIRTHDATE_LEN: usize = 10;

/// Attempts to decode one bet belonging to `agency` from the front of
/// `buffer`. Does not consume `buffer` itself — the caller acts on the
/// returned byte count.
pub fn decode_bet(agency: u8, buffer: &[u8]) -> DecodeOutcome {
    let mut cursor = 0usize;

    macro_rules! need {
        ($n:expr) => {
            if buffer.len() < cursor + $n {
                return DecodeOutcome::NeedMore;
            }
        };
    }

    need!(1);
    let name_len = buffer[cursor] as usize;
    cursor += 1;

    need!(name_len);
    let name_bytes = &buffer[cursor..cursor + name_len];
    cursor += name_len;

    need!(1);
    let surname_len = buffer[cursor] as usize;
    cursor += 1;

    need!(surname_len);
    let surname_bytes = &buffer[cursor..cursor + surname_len];
    cursor += surname_len;

    need!(4);
    let document = u32::from_le_bytes(buffer[cursor..cursor + 4].try_into().unwrap());
    cursor += 4;

    need!(BIRTHDATE_LEN);
    let birthdate_bytes = &buffer[cursor..cursor + BIRTHDATE_LEN];
    cursor += BIRTHDATE_LEN;

    need!(2);
    let number = u16::from_le_bytes(buffer[cursor..cursor + 2].try_into().unwrap());
    cursor += 2;

    let first_name = match std::str::from_utf8(name_bytes) {
        Ok(s) if !s.is_empty() => s.to_string(),
        Ok(_) => return DecodeOutcome::Malformed("first_name must not be empty".to_string()),
        Err(e) => return DecodeOutcome::Malformed(format!("first_name is not valid UTF-8: {e}")),
    };

    let last_name = match std::str::from_utf8(surname_bytes) {
        Ok(s) if !s.is_empty() => s.to_string(),
        Ok(_) => return DecodeOutcome::Malformed("last_name must not be empty".to_string()),
        Err(e) => return DecodeOutcome::Malformed(format!("last_name is not valid UTF-8: {e}")),
    };

    let birthdate_str = match std::str::from_utf8(birthdate_bytes) {
        Ok(s) => s,
        Err(e) => return DecodeOutcome::Malformed(format!("birthdate is not valid UTF-8: {e}")),
    };
    let birthdate = match NaiveDate::parse_from_str(birthdate_str, "%Y-%m-%d") {
        Ok(d) => d,
        Err(e) => return DecodeOutcome::Malformed(format!("birthdate is not a calendar date: {e}")),
    };

    let bet = Bet {
        agency,
        first_name,
        last_name,
        document,
        birthdate,
        number,
    };

    DecodeOutcome::Complete(bet, cursor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_bet(first_name: &str, last_name: &str, document: u32, birthdate: &str, number: u16) -> Vec<u8> {
        let mut out = Vec::new();
        out.push(first_name.len() as u8);
        out.extend_from_slice(first_name.as_bytes());
        out.push(last_name.len() as u8);
        out.extend_from_slice(last_name.as_bytes());
        out.extend_from_slice(&document.to_le_bytes());
        out.extend_from_slice(birthdate.as_bytes());
        out.extend_from_slice(&number.to_le_bytes());
        out
    }

    #[test]
    fn decodes_a_well_formed_bet() {
        let wire = encode_bet("John", "Doe", 1, "1990-01-01", 7582);
        match decode_bet(1, &wire) {
            DecodeOutcome::Complete(bet, consumed) => {
                assert_eq!(consumed, wire.len());
                assert_eq!(bet.agency, 1);
                assert_eq!(bet.first_name, "John");
                assert_eq!(bet.last_name, "Doe");
                assert_eq!(bet.document, 1);
                assert_eq!(bet.birthdate, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap());
                assert_eq!(bet.number, 7582);
            }
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn need_more_on_any_truncation() {
        let wire = encode_bet("John", "Doe", 1, "1990-01-01", 7582);
        for cut in 0..wire.len() {
            match decode_bet(1, &wire[..cut]) {
                DecodeOutcome::NeedMore => {}
                other => panic!("expected NeedMore at cut {cut}, got {:?}", describe(&other)),
            }
        }
    }

    #[test]
    fn leaves_trailing_bytes_for_the_next_bet() {
        let mut wire = encode_bet("John", "Doe", 1, "1990-01-01", 7582);
        wire.extend_from_slice(&[0xAA, 0xBB]);
        match decode_bet(1, &wire) {
            DecodeOutcome::Complete(_, consumed) => assert_eq!(&wire[consumed..], &[0xAA, 0xBB]),
            _ => panic!("expected Complete"),
        }
    }

    #[test]
    fn malformed_utf8_name() {
        let mut wire = encode_bet("John", "Doe", 1, "1990-01-01", 7582);
        wire[1] = 0xFF; // corrupt the first name byte
        match decode_bet(1, &wire) {
            DecodeOutcome::Malformed(_) => {}
            other => panic!("expected Malformed, got {:?}", describe(&other)),
        }
    }

    #[test]
    fn malformed_birthdate() {
        let wire = encode_bet("John", "Doe", 1, "not-a-date", 7582);
        match decode_bet(1, &wire) {
            DecodeOutcome::Malformed(_) => {}
            other => panic!("expected Malformed, got {:?}", describe(&other)),
        }
    }

    fn describe(o: &DecodeOutcome) -> &'static str {
        match o {
            DecodeOutcome::Complete(..) => "Complete",
            DecodeOutcome::NeedMore => "NeedMore",
            DecodeOutcome::Malformed(_) => "Malformed",
        }
    }
}
