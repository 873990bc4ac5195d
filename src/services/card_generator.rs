//! Generation of the card-network fields assigned at issuance: card
//! number, CVV and expiry.

use chrono::{DateTime, Months, NaiveDate, Utc};
use rand::Rng;

const CARD_NUMBER_LEN: usize = 16;
const EXPIRY_MONTHS: u32 = 48;

/// Generates a Luhn-valid 16-digit card number.
pub fn generate_card_number() -> String {
    let mut rng = rand::thread_rng();

    let mut digits: Vec<u8> = Vec::with_capacity(CARD_NUMBER_LEN);
    digits.push(rng.gen_range(1..10));
    for _ in 1..CARD_NUMBER_LEN - 1 {
        digits.push(rng.gen_range(0..10));
    }
    digits.push(luhn_check_digit(&digits));

    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

/// Generates a 3-digit CVV, zero-padded.
pub fn generate_cvv() -> String {
    let mut rng = rand::thread_rng();
    format!("{:03}", rng.gen_range(0..1000))
}

/// Card expiry: four years after creation.
pub fn expiry_from(creation: DateTime<Utc>) -> NaiveDate {
    creation
        .date_naive()
        .checked_add_months(Months::new(EXPIRY_MONTHS))
        .unwrap_or_else(|| creation.date_naive())
}

fn luhn_check_digit(payload: &[u8]) -> u8 {
    let sum: u32 = payload
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            let mut d = u32::from(d);
            if i % 2 == 0 {
                d *= 2;
                if d > 9 {
                    d -= 9;
                }
            }
            d
        })
        .sum();

    ((10 - (sum % 10)) % 10) as u8
}

pub fn is_luhn_valid(number: &str) -> bool {
    let digits: Option<Vec<u8>> = number
        .chars()
        .map(|c| c.to_digit(10).map(|d| d as u8))
        .collect();

    match digits {
        Some(digits) if digits.len() > 1 => {
            let (payload, check) = digits.split_at(digits.len() - 1);
            luhn_check_digit(payload) == check[0]
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_card_number_shape() {
        let number = generate_card_number();
        assert_eq!(number.len(), 16);
        assert!(number.chars().all(|c| c.is_ascii_digit()));
        assert_ne!(number.chars().next(), Some('0'));
    }

    #[test]
    fn test_card_number_is_luhn_valid() {
        for _ in 0..50 {
            assert!(is_luhn_valid(&generate_card_number()));
        }
    }

    #[test]
    fn test_known_luhn_numbers() {
        assert!(is_luhn_valid("4539148803436467"));
        assert!(!is_luhn_valid("4539148803436468"));
        assert!(!is_luhn_valid("not-a-number"));
    }

    #[test]
    fn test_cvv_shape() {
        for _ in 0..50 {
            let cvv = generate_cvv();
            assert_eq!(cvv.len(), 3);
            assert!(cvv.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_expiry_four_years_out() {
        let creation = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            expiry_from(creation),
            NaiveDate::from_ymd_opt(2030, 3, 10).unwrap()
        );
    }
}
