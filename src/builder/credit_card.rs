use crate::protocol::field_model::FieldRole;
use crate::store::store_model::CreditCardEntry;

/// Parse `MM/YY`, `MM/YYYY`, `MM-YY` or `MMYY` into (month, year).
pub fn parse_expiration(value: &str) -> Option<(u32, u32)> {
    let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let (month, year) = match compact.split_once(['/', '-']) {
        Some((m, y)) => (m.to_string(), y.to_string()),
        None if (compact.len() == 4 || compact.len() == 6)
            && compact.chars().all(|c| c.is_ascii_digit()) =>
        {
            let (m, y) = compact.split_at(2);
            (m.to_string(), y.to_string())
        }
        None => return None,
    };
    let month: u32 = month.parse().ok()?;
    let year = parse_year(&year)?;
    (1..=12).contains(&month).then_some((month, year))
}

fn parse_year(value: &str) -> Option<u32> {
    let year: u32 = value.trim().parse().ok()?;
    match value.trim().len() {
        2 => Some(2000 + year),
        4 => Some(year),
        _ => None,
    }
}

/// Card fields accumulated on the current page.
#[derive(Debug, Default)]
pub struct CreditCardBuilder {
    number: Option<String>,
    holder: Option<String>,
    month: Option<u32>,
    year: Option<u32>,
    autofilled: Option<CreditCardEntry>,
    saved: Option<CreditCardEntry>,
}

impl CreditCardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter_page(&mut self) {
        *self = Self::default();
    }

    pub fn update(&mut self, value: &str, role: FieldRole) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match role {
            FieldRole::CardNumber => {
                let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
                if !digits.is_empty() {
                    self.number = Some(digits);
                }
            }
            FieldRole::CardHolder => self.holder = Some(value.to_string()),
            FieldRole::CardExpirationDate => {
                if let Some((month, year)) = parse_expiration(value) {
                    self.month = Some(month);
                    self.year = Some(year);
                }
            }
            FieldRole::CardExpirationMonth => {
                if let Some(month) = value.parse().ok().filter(|m| (1..=12).contains(m)) {
                    self.month = Some(month);
                }
            }
            FieldRole::CardExpirationYear => {
                if let Some(year) = parse_year(value) {
                    self.year = Some(year);
                }
            }
            _ => {}
        }
    }

    pub fn autofill(&mut self, entry: &CreditCardEntry) {
        self.number = Some(entry.card_number.clone());
        self.holder = Some(entry.holder.clone());
        self.month = Some(entry.expiration_month);
        self.year = Some(entry.expiration_year);
        self.autofilled = Some(entry.clone());
    }

    fn candidate(&self) -> Option<CreditCardEntry> {
        let number = self.number.clone()?;
        let mut entry = CreditCardEntry {
            database_id: None,
            description: String::new(),
            card_number: number,
            holder: self.holder.clone().unwrap_or_default(),
            expiration_month: self.month.unwrap_or(0),
            expiration_year: self.year.unwrap_or(0),
        };
        if let Some(filled) = self
            .autofilled
            .as_ref()
            .filter(|f| f.card_number == entry.card_number)
        {
            entry.database_id = filled.database_id;
            entry.description = filled.description.clone();
        }
        Some(entry)
    }

    /// A valid card that differs from what was autofilled and from what was
    /// last evaluated for saving.
    pub fn unsaved_card(&self) -> Option<CreditCardEntry> {
        let entry = self.candidate()?;
        if !entry.is_valid_number() {
            return None;
        }
        if self.autofilled.as_ref().is_some_and(|f| f.same_card(&entry)) {
            return None;
        }
        if self.saved.as_ref().is_some_and(|s| s.same_card(&entry)) {
            return None;
        }
        Some(entry)
    }

    pub fn mark_saved(&mut self) {
        self.saved = self.candidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_expiration_formats() {
        assert_eq!(parse_expiration("04/27"), Some((4, 2027)));
        assert_eq!(parse_expiration("04 / 2027"), Some((4, 2027)));
        assert_eq!(parse_expiration("0427"), Some((4, 2027)));
        assert_eq!(parse_expiration("04-27"), Some((4, 2027)));
        assert_eq!(parse_expiration("13/27"), None);
        assert_eq!(parse_expiration("4/2"), None);
    }

    #[test]
    fn non_ascii_expiration_is_rejected() {
        assert_eq!(parse_expiration("1é1"), None);
        assert_eq!(parse_expiration("1é/1"), None);
        assert_eq!(parse_expiration("12345é"), None);
    }

    #[test]
    fn typed_card_is_unsaved_until_marked() {
        let mut builder = CreditCardBuilder::new();
        builder.update("4005 5192 0000 0004", FieldRole::CardNumber);
        builder.update("Bob Smith", FieldRole::CardHolder);
        builder.update("10/30", FieldRole::CardExpirationDate);
        let card = builder.unsaved_card().unwrap();
        assert_eq!(card.card_number, "4005519200000004");
        assert_eq!((card.expiration_month, card.expiration_year), (10, 2030));

        builder.mark_saved();
        assert!(builder.unsaved_card().is_none());
        builder.update("11", FieldRole::CardExpirationMonth);
        assert!(builder.unsaved_card().is_some());
    }

    #[test]
    fn invalid_number_is_never_offered() {
        let mut builder = CreditCardBuilder::new();
        builder.update("4005519200000000", FieldRole::CardNumber);
        assert!(builder.unsaved_card().is_none());
    }
}
