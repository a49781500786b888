//! Native twin of the script every exported page embeds: picks one option
//! per pool, builds the plaintext body and the platform-adjusted mailto link.

use anyhow::Result;
use rand::Rng;
use rand::seq::IndexedRandom;

use mailweave_core::{Campaign, split_addresses};

/// Practical ceiling some browsers and mail clients put on a mailto URI.
/// Crossing it is a diagnostic, never a construction failure.
pub const MAILTO_SOFT_LIMIT: usize = 1998;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    MacOs,
    Android,
    Windows,
    Linux,
    Unknown,
}

impl Platform {
    /// The single point where platform knowledge selects an encoding profile.
    pub fn encoding_profile(self) -> EncodingProfile {
        match self {
            Platform::Ios => EncodingProfile::IosSpecific,
            _ => EncodingProfile::Standard,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingProfile {
    Standard,
    /// Apple Mail wants CRLF-style encoded breaks in the query string.
    IosSpecific,
}

/// What the exported page can sniff about the device it is opened on.
#[derive(Debug, Clone, Default)]
pub struct ClientEnv {
    pub user_agent: String,
    pub platform: String,
    pub max_touch_points: u32,
}

/// Best-effort device classification, rules tried in priority order.
pub fn detect_platform(env: &ClientEnv) -> Platform {
    let ua = env.user_agent.as_str();
    let plat = env.platform.as_str();

    if ["iPad", "iPhone", "iPod"].iter().any(|d| plat.contains(d)) {
        return Platform::Ios;
    }
    let ios_ua = ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod");
    if ios_ua && !ua.contains("Windows Phone") {
        return Platform::Ios;
    }
    // iPads asking for desktop sites report themselves as Macintosh.
    if ua.contains("Macintosh") && ua.contains("Mobile") {
        return Platform::Ios;
    }
    if ua.contains("Macintosh") && env.max_touch_points > 1 {
        return Platform::Ios;
    }
    if ["Macintosh", "MacIntel", "MacPPC", "Mac68K"].contains(&plat) {
        return Platform::MacOs;
    }
    if ua.contains("Android") {
        return Platform::Android;
    }
    if plat.contains("Win") {
        return Platform::Windows;
    }
    if plat.contains("Linux") && !ua.contains("Android") {
        return Platform::Linux;
    }
    Platform::Unknown
}

/// One uniform draw per pool. Empty pools yield empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub subject: String,
    pub para1: String,
    pub para2: String,
    pub para3: String,
    pub signoff: String,
}

pub fn select<R: Rng + ?Sized>(campaign: &Campaign, rng: &mut R) -> Selection {
    Selection {
        subject: pick(&campaign.subject_lines, rng),
        para1: pick(&campaign.para1_options, rng),
        para2: pick(&campaign.para2_options, rng),
        para3: pick(&campaign.para3_options, rng),
        signoff: pick(&campaign.signing_off_options, rng),
    }
}

fn pick<R: Rng + ?Sized>(pool: &[String], rng: &mut R) -> String {
    pool.choose(rng).cloned().unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("no usable TO address; the Send action stays disabled")]
pub struct LinkUnavailable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthReport {
    pub length: usize,
    pub over_limit: bool,
}

/// Everything the page controller needs after preparation: the chosen
/// options, the preview body, and either a link or the reason there is none.
#[derive(Debug, Clone)]
pub struct PreparedMail {
    pub selection: Selection,
    pub body_text: String,
    pub link: Option<String>,
    pub unavailable: Option<LinkUnavailable>,
    pub length: Option<LengthReport>,
    pub platform: Platform,
    pub profile: EncodingProfile,
}

/// Runs the full idle → prepared transition: select, build the body, build
/// the query string, adjust it for the detected platform, encode the TO
/// addresses and assemble the link with its length diagnostic.
pub fn prepare_mail<R: Rng + ?Sized>(
    campaign: &Campaign,
    env: &ClientEnv,
    rng: &mut R,
) -> Result<PreparedMail> {
    let selection = select(campaign, rng);
    let body_text = join_body(&selection);

    let cc = campaign.cc_addresses.join(",");
    let bcc = campaign.bcc_address.clone();

    let mut params: Vec<(&str, &str)> = Vec::new();
    if !cc.is_empty() {
        params.push(("cc", cc.as_str()));
    }
    if !bcc.is_empty() {
        params.push(("bcc", bcc.as_str()));
    }
    if !selection.subject.is_empty() {
        params.push(("subject", selection.subject.as_str()));
    }
    if !body_text.is_empty() {
        params.push(("body", body_text.as_str()));
    }

    // Form-encode first (spaces come out as '+'), then force spaces back to
    // %20; the iOS line-break rewrite happens strictly after that. The order
    // is a behavioral contract, not a free choice.
    let mut query = serde_urlencoded::to_string(&params)?.replace('+', "%20");
    let platform = detect_platform(env);
    let profile = platform.encoding_profile();
    if profile == EncodingProfile::IosSpecific {
        query = query.replace("%0A", "%0D%0A");
    }

    let to = encode_to_addresses(&campaign.to_addresses.join(","));
    let (link, unavailable, length) = match to {
        Some(to) => {
            let link = if query.is_empty() {
                format!("mailto:{}", to)
            } else {
                format!("mailto:{}?{}", to, query)
            };
            let length = LengthReport {
                length: link.len(),
                over_limit: link.len() > MAILTO_SOFT_LIMIT,
            };
            (Some(link), None, Some(length))
        }
        None => (None, Some(LinkUnavailable), None),
    };

    Ok(PreparedMail {
        selection,
        body_text,
        link,
        unavailable,
        length,
        platform,
        profile,
    })
}

/// Non-empty selected paragraphs and signoff joined with a blank line.
/// The subject never appears in the body.
fn join_body(selection: &Selection) -> String {
    [
        selection.para1.as_str(),
        selection.para2.as_str(),
        selection.para3.as_str(),
        selection.signoff.as_str(),
    ]
    .iter()
    .filter(|part| !part.is_empty())
    .copied()
    .collect::<Vec<_>>()
    .join("\n\n")
}

/// Percent-encodes each address on its own and rejoins with the literal
/// comma separator mail clients expect. None when nothing usable remains.
fn encode_to_addresses(joined: &str) -> Option<String> {
    let addresses = split_addresses(joined);
    if addresses.is_empty() {
        return None;
    }
    Some(
        addresses
            .iter()
            .map(|addr| urlencoding::encode(addr).into_owned())
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// The text the Copy action puts on the clipboard: header lines (Cc/Bcc only
/// when present) then the body after a blank line.
pub fn copy_text(campaign: &Campaign, selection: &Selection, body_text: &str) -> String {
    let mut out = String::new();
    out.push_str(&format!("To: {}\n", campaign.to_addresses.join(",")));
    let cc = campaign.cc_addresses.join(",");
    if !cc.is_empty() {
        out.push_str(&format!("Cc: {}\n", cc));
    }
    if !campaign.bcc_address.is_empty() {
        out.push_str(&format!("Bcc: {}\n", campaign.bcc_address));
    }
    out.push_str(&format!("Subject: {}\n\n", selection.subject));
    out.push_str(body_text);
    out
}
