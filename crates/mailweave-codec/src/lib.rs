//! Encoder and Decoder for exported campaign pages.
//!
//! An exported page is a standalone HTML document carrying the campaign data
//! as a marker-delimited block of script constants, followed by the static
//! runtime that turns those constants into a mailto link in the recipient's
//! browser. The Decoder re-reads that block out of arbitrary uploaded HTML,
//! degrading to empty fields instead of failing.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use mailweave_core::{Campaign, log_debug, split_addresses};

pub const SCRIPT_START_MARKER: &str = "// --- Embedded Mail Generation Script START ---";
pub const SCRIPT_END_MARKER: &str = "// --- Embedded Mail Generation Script END ---";

const ARRAY_CONSTANTS: [&str; 5] = [
    "SUBJECT_LINES",
    "PARA1_OPTIONS",
    "PARA2_OPTIONS",
    "PARA3_OPTIONS",
    "SIGNING_OFF_OPTIONS",
];

// --- Encoder ---

/// Renders one complete exported page. The markers, the eight constants and
/// the runtime block appear exactly once; the title is entity-escaped and
/// falls back to the placeholder when the campaign leaves it blank.
pub fn encode(campaign: &Campaign) -> String {
    let title = html_escape::encode_quoted_attribute(campaign.title_or_default()).into_owned();
    let to = campaign.to_addresses.join(",");
    let cc = campaign.cc_addresses.join(",");
    let bcc = campaign.bcc_address.as_str();

    let mut constants = String::new();
    push_string_const(&mut constants, "TO_ADDRESS", &to);
    push_string_const(&mut constants, "CC_ADDRESS", &cc);
    push_string_const(&mut constants, "BCC_ADDRESS", bcc);
    push_array_const(&mut constants, "SUBJECT_LINES", &campaign.subject_lines);
    push_array_const(&mut constants, "PARA1_OPTIONS", &campaign.para1_options);
    push_array_const(&mut constants, "PARA2_OPTIONS", &campaign.para2_options);
    push_array_const(&mut constants, "PARA3_OPTIONS", &campaign.para3_options);
    push_array_const(
        &mut constants,
        "SIGNING_OFF_OPTIONS",
        &campaign.signing_off_options,
    );

    let mut doc = String::new();
    doc.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    doc.push_str("<meta charset=\"UTF-8\">\n");
    doc.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n");
    doc.push_str(&format!("<title>{}</title>\n", title));
    doc.push_str(PAGE_STYLE);
    doc.push_str("</head>\n<body>\n<div class=\"container\">\n");
    doc.push_str("<h5>Email Preview &amp; Actions</h5>\n");
    doc.push_str(
        "<p class=\"hint\">If your email app doesn't open, please use the copy button.</p>\n",
    );
    doc.push_str("<div class=\"actions\">\n");
    doc.push_str("<button id=\"send\" type=\"button\">Send Mail</button>\n");
    doc.push_str("<button id=\"copy\" type=\"button\">Copy Email Content</button>\n");
    doc.push_str("</div>\n");
    doc.push_str("<p id=\"send-reason\" class=\"reason\" style=\"display:none\"></p>\n");
    doc.push_str("<h6>Email Details:</h6>\n<div id=\"email-details\">\n");
    doc.push_str(&format!(
        "<p id=\"to-line\"><strong>To:</strong> <span id=\"preview-to\">{}</span></p>\n",
        html_escape::encode_text(&to)
    ));
    // Cc/Bcc lines only exist when there is something to show; the runtime's
    // setLine null-guards the absent rows.
    if !cc.is_empty() {
        doc.push_str(&format!(
            "<p id=\"cc-line\"><strong>Cc:</strong> <span id=\"preview-cc\">{}</span></p>\n",
            html_escape::encode_text(&cc)
        ));
    }
    if !bcc.is_empty() {
        doc.push_str(&format!(
            "<p id=\"bcc-line\"><strong>Bcc:</strong> <span id=\"preview-bcc\">{}</span></p>\n",
            html_escape::encode_text(bcc)
        ));
    }
    doc.push_str(
        "<p><strong>Subject:</strong> <span id=\"preview-subject\">(Generating...)</span></p>\n",
    );
    doc.push_str("</div>\n<h6>Email Body Preview:</h6>\n");
    doc.push_str("<div id=\"email-preview\" class=\"email-preview\">(Generating...)</div>\n");
    doc.push_str("</div>\n<script>\n");
    doc.push_str(SCRIPT_START_MARKER);
    doc.push('\n');
    doc.push_str(&constants);
    doc.push_str(RUNTIME_SCRIPT);
    doc.push_str(SCRIPT_END_MARKER);
    doc.push_str("\n</script>\n</body>\n</html>\n");
    doc
}

fn push_string_const(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!(
        "const {} = \"{}\";\n",
        name,
        escape_script_string(value)
    ));
}

fn push_array_const(out: &mut String, name: &str, values: &[String]) {
    let json = serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string());
    out.push_str(&format!("const {} = {};\n", name, json));
}

/// Escape order is load-bearing: backslash first, then quote, then the
/// whitespace escapes, then the script-tag-breaking angle brackets.
fn escape_script_string(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
        .replace('<', "\\x3C")
        .replace('>', "\\x3E")
}

const PAGE_STYLE: &str = "<style>\n\
body{background-color:white;color:black;font-family:sans-serif;padding:1rem;}\n\
.container{max-width:800px;margin:0 auto;}\n\
.actions{text-align:center;margin-bottom:1.5rem;}\n\
.actions button{padding:.5rem 1rem;margin-right:.5rem;cursor:pointer;}\n\
.actions button:disabled{cursor:not-allowed;opacity:.6;}\n\
.hint{text-align:center;color:#6c757d;font-size:.875rem;}\n\
.reason{text-align:center;color:#b02a37;}\n\
.email-preview{background-color:#f8f9fa;border:1px solid #dee2e6;padding:1.5rem;margin-top:1rem;\
white-space:pre-wrap;word-wrap:break-word;font-family:monospace;max-height:50vh;overflow-y:auto;}\n\
#email-details p{margin-bottom:.5rem;word-wrap:break-word;}\n\
</style>\n";

/// The static logic every exported page runs. It mirrors mailweave-link
/// operation for operation; changes here must land there too.
const RUNTIME_SCRIPT: &str = r#"
let preparedMail = null;

function getRandomElement(arr) {
    if (!arr || arr.length === 0) return '';
    return arr[Math.floor(Math.random() * arr.length)];
}

function escapeForDisplay(text) {
    if (typeof text !== 'string') return '';
    return text.replace(/&/g, '&amp;').replace(/</g, '&lt;').replace(/>/g, '&gt;')
        .replace(/"/g, '&quot;').replace(/'/g, '&#039;');
}

function detectPlatform() {
    const ua = navigator.userAgent || '';
    const platform = (navigator.userAgentData && navigator.userAgentData.platform)
        || navigator.platform || '';
    const touchPoints = navigator.maxTouchPoints || 0;
    if (/iPad|iPhone|iPod/.test(platform)) return 'ios';
    if (/iPhone|iPad|iPod/.test(ua) && !/Windows Phone/.test(ua)) return 'ios';
    if (ua.includes('Macintosh') && ua.includes('Mobile')) return 'ios';
    if (ua.includes('Macintosh') && touchPoints > 1) return 'ios';
    if (/^(Macintosh|MacIntel|MacPPC|Mac68K)$/.test(platform)) return 'macos';
    if (ua.includes('Android')) return 'android';
    if (platform.includes('Win')) return 'windows';
    if (platform.includes('Linux') && !ua.includes('Android')) return 'linux';
    return 'unknown';
}

function encodingProfile(platform) {
    return platform === 'ios' ? 'ios_specific' : 'standard';
}

function prepareMail() {
    try {
        const subject = getRandomElement(SUBJECT_LINES);
        const parts = [
            getRandomElement(PARA1_OPTIONS),
            getRandomElement(PARA2_OPTIONS),
            getRandomElement(PARA3_OPTIONS),
            getRandomElement(SIGNING_OFF_OPTIONS)
        ];
        const body = parts.filter(Boolean).join('\n\n');

        const params = new URLSearchParams();
        if (CC_ADDRESS) params.append('cc', CC_ADDRESS);
        if (BCC_ADDRESS) params.append('bcc', BCC_ADDRESS);
        if (subject) params.append('subject', subject);
        if (body) params.append('body', body);

        let query = params.toString().replace(/\+/g, '%20');
        if (encodingProfile(detectPlatform()) === 'ios_specific') {
            query = query.replace(/%0A/g, '%0D%0A');
        }

        const toAddresses = TO_ADDRESS.split(',').map(a => a.trim()).filter(Boolean);
        let link = '';
        let reason = '';
        if (toAddresses.length === 0) {
            reason = 'No usable TO address; the Send action is disabled.';
        } else {
            const encodedTo = toAddresses.map(encodeURIComponent).join(',');
            link = query ? 'mailto:' + encodedTo + '?' + query : 'mailto:' + encodedTo;
            if (link.length > 1998) {
                console.warn('mailto link is ' + link.length
                    + ' characters; some clients truncate past 1998');
            } else {
                console.info('mailto link length: ' + link.length);
            }
        }

        preparedMail = { subject: subject, body: body, link: link, reason: reason };
        updateView(preparedMail);
    } catch (err) {
        console.error('Error preparing mail:', err);
        preparedMail = null;
        const send = document.getElementById('send');
        if (send) send.disabled = true;
        alert('An error occurred while preparing the email preview.');
    }
}

function setLine(rowId, slotId, value) {
    const row = document.getElementById(rowId);
    const slot = document.getElementById(slotId);
    if (row) row.style.display = value ? '' : 'none';
    if (slot) slot.textContent = value;
}

function updateView(mail) {
    setLine('to-line', 'preview-to', TO_ADDRESS);
    setLine('cc-line', 'preview-cc', CC_ADDRESS);
    setLine('bcc-line', 'preview-bcc', BCC_ADDRESS);
    const subjectElem = document.getElementById('preview-subject');
    if (subjectElem) subjectElem.textContent = escapeForDisplay(mail.subject);
    const previewElem = document.getElementById('email-preview');
    if (previewElem) previewElem.textContent = mail.body;
    const send = document.getElementById('send');
    if (send) send.disabled = !mail.link;
    const reasonElem = document.getElementById('send-reason');
    if (reasonElem) {
        reasonElem.textContent = mail.reason;
        reasonElem.style.display = mail.reason ? '' : 'none';
    }
}

function fullCopyText(mail) {
    let text = 'To: ' + TO_ADDRESS + '\n';
    if (CC_ADDRESS) text += 'Cc: ' + CC_ADDRESS + '\n';
    if (BCC_ADDRESS) text += 'Bcc: ' + BCC_ADDRESS + '\n';
    text += 'Subject: ' + mail.subject + '\n\n' + mail.body;
    return text;
}

function copyWithFallback(text) {
    navigator.clipboard.writeText(text).then(() => {
        alert('Email content copied to clipboard!');
    }).catch(err => {
        console.warn('Clipboard API failed, trying fallback:', err);
        const textarea = document.createElement('textarea');
        textarea.value = text;
        textarea.style.position = 'fixed';
        textarea.style.left = '-9999px';
        document.body.appendChild(textarea);
        textarea.select();
        try {
            document.execCommand('copy');
            alert('Email content copied (fallback)!');
        } catch (errFallback) {
            console.error('Fallback copy failed:', errFallback);
            alert('Failed to copy automatically.');
        }
        document.body.removeChild(textarea);
    });
}

document.addEventListener('DOMContentLoaded', () => {
    const send = document.getElementById('send');
    if (send) {
        send.addEventListener('click', () => {
            if (preparedMail && preparedMail.link) {
                window.location.href = preparedMail.link;
            } else {
                alert('Could not generate mailto link. Please ensure a TO address is provided.');
            }
        });
    }
    const copy = document.getElementById('copy');
    if (copy) {
        copy.addEventListener('click', () => {
            if (!preparedMail || (!preparedMail.body && !preparedMail.subject)) {
                alert('Email content not generated yet. Please reload the page.');
                return;
            }
            copyWithFallback(fullCopyText(preparedMail));
        });
    }
    prepareMail();
});
"#;

// --- Decoder ---

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeWarning {
    #[error("embedded script block not found; only the page title could be read")]
    ScriptBlockMissing,
    #[error("constant {0} not found in the script block")]
    ConstantMissing(&'static str),
    #[error("constant {0} was not valid JSON; recovered with lenient parsing")]
    ArrayRecovered(&'static str),
    #[error("constant {0} could not be read as a list of strings")]
    ArrayUnreadable(&'static str),
}

/// Best-effort decode result. Missing pieces come back empty, with one
/// warning per degradation so the caller can surface an aggregate notice.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub campaign: Campaign,
    pub warnings: Vec<DecodeWarning>,
}

impl Decoded {
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn script_block_missing(&self) -> bool {
        self.warnings.contains(&DecodeWarning::ScriptBlockMissing)
    }
}

/// Re-reads a previously exported page. Never fails: any HTML text yields a
/// `Campaign`, with warnings describing whatever could not be recovered.
pub fn decode(html: &str) -> Decoded {
    let mut warnings = Vec::new();
    let mut campaign = Campaign {
        page_title: extract_title(html),
        ..Campaign::default()
    };

    let Some(block) = extract_script_block(html) else {
        log_debug("decode: script markers not found, returning title-only campaign");
        warnings.push(DecodeWarning::ScriptBlockMissing);
        return Decoded { campaign, warnings };
    };

    let strings = parse_string_constants(block);
    let mut arrays = parse_array_constants(block, &mut warnings);

    campaign.to_addresses =
        split_addresses(&take_string(&strings, "TO_ADDRESS", &mut warnings));
    campaign.cc_addresses =
        split_addresses(&take_string(&strings, "CC_ADDRESS", &mut warnings));
    campaign.bcc_address = take_string(&strings, "BCC_ADDRESS", &mut warnings);
    campaign.subject_lines = take_array(&mut arrays, "SUBJECT_LINES", &mut warnings);
    campaign.para1_options = take_array(&mut arrays, "PARA1_OPTIONS", &mut warnings);
    campaign.para2_options = take_array(&mut arrays, "PARA2_OPTIONS", &mut warnings);
    campaign.para3_options = take_array(&mut arrays, "PARA3_OPTIONS", &mut warnings);
    campaign.signing_off_options = take_array(&mut arrays, "SIGNING_OFF_OPTIONS", &mut warnings);

    Decoded { campaign, warnings }
}

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern"))
}

// Both assignment patterns are anchored to line start: the encoder emits one
// constant per line with every embedded newline escaped, so anything
// const-shaped in the middle of a line is payload text, not an assignment.
fn string_const_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^[ \t]*const\s+([A-Z][A-Z0-9_]*)\s*=\s*(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')\s*;"#,
        )
        .expect("string constant pattern")
    })
}

// The bracketed list must also close at end of line, so a "];" inside one of
// its string values cannot terminate the match early.
fn array_const_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?sm)^[ \t]*const\s+([A-Z][A-Z0-9_]*)\s*=\s*(\[.*?\])\s*;[ \t]*\r?$")
            .expect("array constant pattern")
    })
}

fn extract_title(html: &str) -> String {
    title_re()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| {
            html_escape::decode_html_entities(m.as_str())
                .trim()
                .to_string()
        })
        .unwrap_or_default()
}

/// The text strictly between the start marker and the first end marker after
/// it. None when either marker is absent.
fn extract_script_block(html: &str) -> Option<&str> {
    let start = html.find(SCRIPT_START_MARKER)? + SCRIPT_START_MARKER.len();
    let rest = &html[start..];
    let end = rest.find(SCRIPT_END_MARKER)?;
    Some(&rest[..end])
}

/// Every `const NAME = "…";` assignment in the block, either quote style,
/// values unescaped.
fn parse_string_constants(block: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for caps in string_const_re().captures_iter(block) {
        let name = caps[1].to_string();
        let raw = caps
            .get(2)
            .or_else(|| caps.get(3))
            .map(|m| m.as_str())
            .unwrap_or_default();
        out.insert(name, unescape_script_string(raw));
    }
    out
}

/// Every bracketed-list assignment among the expected array constants,
/// parsed as JSON with the lenient comma-split as the fallback strategy.
fn parse_array_constants(
    block: &str,
    warnings: &mut Vec<DecodeWarning>,
) -> HashMap<String, Vec<String>> {
    let mut out = HashMap::new();
    for caps in array_const_re().captures_iter(block) {
        let Some(&name) = ARRAY_CONSTANTS.iter().find(|&&n| n == &caps[1]) else {
            continue;
        };
        let bracketed = &caps[2];
        match serde_json::from_str::<Vec<String>>(bracketed) {
            Ok(values) => {
                out.insert(name.to_string(), values);
            }
            Err(err) => {
                log_debug(&format!(
                    "decode: {} is not a JSON string array ({}), trying lenient parse",
                    name, err
                ));
                let values = lenient_array_parse(bracketed);
                if values.is_empty() {
                    warnings.push(DecodeWarning::ArrayUnreadable(name));
                } else {
                    warnings.push(DecodeWarning::ArrayRecovered(name));
                }
                out.insert(name.to_string(), values);
            }
        }
    }
    out
}

/// Secondary strategy for arrays that are not valid JSON: strip the
/// brackets, split on commas, strip one layer of quotes per piece.
fn lenient_array_parse(bracketed: &str) -> Vec<String> {
    let inner = bracketed
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    inner
        .split(',')
        .map(|piece| {
            piece
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string()
        })
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn take_string(
    strings: &HashMap<String, String>,
    name: &'static str,
    warnings: &mut Vec<DecodeWarning>,
) -> String {
    match strings.get(name) {
        Some(value) => value.clone(),
        None => {
            log_debug(&format!("decode: string constant {} missing", name));
            warnings.push(DecodeWarning::ConstantMissing(name));
            String::new()
        }
    }
}

fn take_array(
    arrays: &mut HashMap<String, Vec<String>>,
    name: &'static str,
    warnings: &mut Vec<DecodeWarning>,
) -> Vec<String> {
    match arrays.remove(name) {
        Some(values) => values,
        None => {
            log_debug(&format!("decode: array constant {} missing", name));
            warnings.push(DecodeWarning::ConstantMissing(name));
            Vec::new()
        }
    }
}

/// Reverses `escape_script_string`, with JS semantics for escapes the
/// encoder never emits (the backslash is dropped, the character kept).
fn unescape_script_string(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('x') => {
                let hex: String = chars.by_ref().take(2).collect();
                match u8::from_str_radix(&hex, 16) {
                    Ok(byte) => out.push(byte as char),
                    Err(_) => {
                        out.push('x');
                        out.push_str(&hex);
                    }
                }
            }
            Some(other) => out.push(other),
            None => break,
        }
    }
    out
}
