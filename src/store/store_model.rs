use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored login, without its secret.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PasswordEntry {
    pub host: String,
    pub username: String,
}

impl PasswordEntry {
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        PasswordEntry {
            host: host.into(),
            username: username.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl Credential {
    pub fn entry(&self) -> PasswordEntry {
        PasswordEntry::new(self.host.clone(), self.username.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardType {
    Visa,
    MasterCard,
    Amex,
    Discover,
    Diners,
    Jcb,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationStatus {
    Invalid,
    Valid,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditCardEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_id: Option<Uuid>,
    #[serde(default)]
    pub description: String,
    pub card_number: String,
    #[serde(default)]
    pub holder: String,
    pub expiration_month: u32,
    pub expiration_year: u32,
}

impl CreditCardEntry {
    pub fn card_type(&self) -> CardType {
        let number = self.card_number.as_str();
        match number.chars().next() {
            Some('2' | '5') => CardType::MasterCard,
            Some('3') => match number.get(..2) {
                Some("30" | "36" | "38") => CardType::Diners,
                Some("34" | "37") => CardType::Amex,
                Some("35") => CardType::Jcb,
                _ => CardType::Unknown,
            },
            Some('4') => CardType::Visa,
            Some('6') => CardType::Discover,
            _ => CardType::Unknown,
        }
    }

    /// Luhn checksum plus the length rules of the card's network.
    pub fn is_valid_number(&self) -> bool {
        let Some(digits) = self
            .card_number
            .chars()
            .map(|c| c.to_digit(10))
            .collect::<Option<Vec<u32>>>()
        else {
            return false;
        };
        if luhn_sum(&digits) % 10 != 0 {
            return false;
        }
        let len = digits.len();
        match self.card_type() {
            CardType::Visa => len == 13 || len == 16,
            CardType::MasterCard | CardType::Jcb | CardType::Discover => len == 16,
            CardType::Amex => len == 15,
            CardType::Diners => len == 14,
            CardType::Unknown => (13..=19).contains(&len),
        }
    }

    pub fn expiration_status(&self, current_month: u32, current_year: u32) -> ExpirationStatus {
        if !(1..=12).contains(&self.expiration_month) || self.expiration_year < 2000 {
            return ExpirationStatus::Invalid;
        }
        if self.expiration_year * 12 + self.expiration_month < current_year * 12 + current_month {
            return ExpirationStatus::Expired;
        }
        ExpirationStatus::Valid
    }

    pub fn obfuscated_number(&self) -> String {
        let len = self.card_number.chars().count();
        if len <= 4 {
            return String::new();
        }
        let suffix: String = self.card_number.chars().skip(len - 4).collect();
        let masked = format!("{}{}", "x".repeat(len - 4), suffix);
        self.grouped(&masked, "-")
    }

    pub fn formatted_number(&self) -> String {
        self.grouped(&self.card_number, " ")
    }

    pub fn formatted_month(&self) -> String {
        format!("{:02}", self.expiration_month)
    }

    pub fn formatted_year(&self) -> String {
        format!("{:04}", self.expiration_year)
    }

    /// `MM/YY`, empty when either part is unset.
    pub fn formatted_date(&self) -> String {
        if self.expiration_month == 0 || self.expiration_year == 0 {
            return String::new();
        }
        format!("{}/{:02}", self.formatted_month(), self.expiration_year % 100)
    }

    pub fn same_card(&self, other: &CreditCardEntry) -> bool {
        self.card_number == other.card_number
            && self.holder == other.holder
            && self.expiration_month == other.expiration_month
            && self.expiration_year == other.expiration_year
    }

    fn grouped(&self, number: &str, separator: &str) -> String {
        let runs: &[usize] = match (self.card_type(), number.chars().count()) {
            (CardType::Visa, 13) => &[4, 3, 3, 3],
            (CardType::Amex, _) => &[4, 6, 5],
            (CardType::Diners, _) => &[4, 6, 4],
            _ => &[4, 4, 4, 4],
        };
        let chars: Vec<char> = number.chars().collect();
        let mut parts = Vec::new();
        let mut start = 0;
        for run in runs {
            if start >= chars.len() {
                break;
            }
            let end = (start + run).min(chars.len());
            parts.push(chars[start..end].iter().collect::<String>());
            start = end;
        }
        if start < chars.len() {
            parts.push(chars[start..].iter().collect());
        }
        parts.join(separator)
    }
}

fn luhn_sum(digits: &[u32]) -> u32 {
    digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, d)| if i % 2 == 0 { *d } else { d * 2 })
        .map(|d| if d > 9 { d - 9 } else { d })
        .sum()
}
