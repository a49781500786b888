use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Title written into an exported page when the campaign leaves it blank.
pub const DEFAULT_PAGE_TITLE: &str = "Mail Campaign";

/// One configured mail-merge campaign: recipients plus the option pools the
/// exported page draws from. Address lists keep their order for display;
/// selection never reorders them. `bcc_address` stays a single opaque string
/// even when it holds several comma-separated addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Campaign {
    pub page_title: String,
    pub to_addresses: Vec<String>,
    pub cc_addresses: Vec<String>,
    pub bcc_address: String,
    pub subject_lines: Vec<String>,
    pub para1_options: Vec<String>,
    pub para2_options: Vec<String>,
    pub para3_options: Vec<String>,
    pub signing_off_options: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    ToAddresses,
    SubjectLines,
    Para1Options,
    Para2Options,
    Para3Options,
    SigningOffOptions,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::ToAddresses => "TO address",
            Field::SubjectLines => "Subject Line option",
            Field::Para1Options => "Body Paragraph 1 option",
            Field::Para2Options => "Body Paragraph 2 option",
            Field::Para3Options => "Body Paragraph 3 option",
            Field::SigningOffOptions => "Signing Off option",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("please provide at least one {0}")]
    MissingField(Field),
}

impl Campaign {
    /// Checks exportability. Reports the first empty required pool in a fixed
    /// order; page title, cc and bcc are never required.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let required = [
            (Field::ToAddresses, &self.to_addresses),
            (Field::SubjectLines, &self.subject_lines),
            (Field::Para1Options, &self.para1_options),
            (Field::Para2Options, &self.para2_options),
            (Field::Para3Options, &self.para3_options),
            (Field::SigningOffOptions, &self.signing_off_options),
        ];
        for (field, entries) in required {
            if entries.is_empty() {
                return Err(ValidationError::MissingField(field));
            }
        }
        Ok(())
    }

    /// Trims every entry and drops the ones that end up empty, enforcing the
    /// stored-strings invariant at the point of collection.
    pub fn normalized(self) -> Campaign {
        Campaign {
            page_title: self.page_title.trim().to_string(),
            to_addresses: clean_entries(self.to_addresses),
            cc_addresses: clean_entries(self.cc_addresses),
            bcc_address: self.bcc_address.trim().to_string(),
            subject_lines: clean_entries(self.subject_lines),
            para1_options: clean_entries(self.para1_options),
            para2_options: clean_entries(self.para2_options),
            para3_options: clean_entries(self.para3_options),
            signing_off_options: clean_entries(self.signing_off_options),
        }
    }

    pub fn title_or_default(&self) -> &str {
        if self.page_title.trim().is_empty() {
            DEFAULT_PAGE_TITLE
        } else {
            &self.page_title
        }
    }
}

fn clean_entries(entries: Vec<String>) -> Vec<String> {
    entries
        .into_iter()
        .map(|entry| entry.trim().to_string())
        .filter(|entry| !entry.is_empty())
        .collect()
}

/// Comma-joined address strings lose per-address boundaries for addresses
/// that themselves contain a comma; this split is the accepted inverse.
pub fn split_addresses(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(|piece| piece.trim().to_string())
        .filter(|piece| !piece.is_empty())
        .collect()
}

static LOG_FILE: OnceLock<Mutex<Option<std::fs::File>>> = OnceLock::new();

pub fn log_debug(msg: &str) {
    if std::env::var("MAILWEAVE_LOG").is_err() {
        return;
    }
    let base = std::env::var_os("XDG_STATE_HOME")
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("state"))
        })
        .unwrap_or_else(|| PathBuf::from("/tmp"));
    let path = base.join("mailweave").join("mailweave.log");
    let lock = LOG_FILE.get_or_init(|| {
        let _ = std::fs::create_dir_all(
            path.parent()
                .unwrap_or_else(|| std::path::Path::new("/tmp")),
        );
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok();
        Mutex::new(file)
    });
    if let Ok(mut guard) = lock.lock() {
        if let Some(file) = guard.as_mut() {
            let ts = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            let _ = writeln!(file, "[{}] {}", ts, msg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Campaign, Field, ValidationError, split_addresses};

    fn filled_campaign() -> Campaign {
        Campaign {
            page_title: "Campaign".to_string(),
            to_addresses: vec!["a@x.com".to_string()],
            cc_addresses: vec![],
            bcc_address: String::new(),
            subject_lines: vec!["Hi".to_string()],
            para1_options: vec!["P1".to_string()],
            para2_options: vec!["P2".to_string()],
            para3_options: vec!["P3".to_string()],
            signing_off_options: vec!["Bye".to_string()],
        }
    }

    #[test]
    fn validate_accepts_filled_campaign() {
        assert!(filled_campaign().validate().is_ok());
    }

    #[test]
    fn validate_reports_first_missing_field_in_fixed_order() {
        let mut campaign = filled_campaign();
        campaign.para2_options.clear();
        campaign.signing_off_options.clear();

        assert_eq!(
            campaign.validate().unwrap_err(),
            ValidationError::MissingField(Field::Para2Options),
            "para2 comes before signoff in the required-field order"
        );
    }

    #[test]
    fn validate_never_requires_title_cc_or_bcc() {
        let mut campaign = filled_campaign();
        campaign.page_title.clear();
        campaign.cc_addresses.clear();
        campaign.bcc_address.clear();
        assert!(campaign.validate().is_ok());
    }

    #[test]
    fn normalized_trims_and_drops_empty_entries() {
        let mut campaign = filled_campaign();
        campaign.subject_lines = vec![
            "  Hello  ".to_string(),
            "   ".to_string(),
            String::new(),
            "World".to_string(),
        ];
        let campaign = campaign.normalized();
        assert_eq!(campaign.subject_lines, vec!["Hello", "World"]);
    }

    #[test]
    fn split_addresses_trims_and_skips_empty_pieces() {
        assert_eq!(
            split_addresses(" a@x.com , ,b@y.com,"),
            vec!["a@x.com", "b@y.com"]
        );
        assert!(split_addresses(",").is_empty());
        assert!(split_addresses("").is_empty());
    }

    #[test]
    fn title_or_default_falls_back_on_blank_title() {
        let mut campaign = filled_campaign();
        campaign.page_title = "  ".to_string();
        assert_eq!(campaign.title_or_default(), super::DEFAULT_PAGE_TITLE);
        campaign.page_title = "Save the Bees".to_string();
        assert_eq!(campaign.title_or_default(), "Save the Bees");
    }
}
