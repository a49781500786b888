use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use rand::SeedableRng;
use rand::rngs::StdRng;

use mailweave_codec::{Decoded, decode, encode};
use mailweave_core::{Campaign, log_debug};
use mailweave_link::{ClientEnv, EncodingProfile, copy_text, prepare_mail};

#[derive(Parser, Debug)]
#[command(
    name = "mailweave",
    version,
    about = "Mail-merge campaign page generator"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Export a campaign file as a self-contained HTML page
    Export(ExportCmd),
    /// Load a previously exported page back into a campaign file
    Load(LoadCmd),
    /// Show the mail a recipient would get on opening an exported page
    Preview(PreviewCmd),
}

#[derive(Args, Debug)]
struct ExportCmd {
    /// Campaign description (TOML)
    campaign: PathBuf,
    /// Output page path; defaults to the campaign name with .html
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LoadCmd {
    /// Previously exported HTML page
    page: PathBuf,
    /// Campaign TOML destination; stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PreviewCmd {
    /// Exported page (.html) or campaign file (.toml)
    input: PathBuf,
    /// User agent string to classify instead of none
    #[arg(long)]
    user_agent: Option<String>,
    /// Device platform string (navigator.platform analogue)
    #[arg(long)]
    platform: Option<String>,
    #[arg(long, default_value_t = 0)]
    touch_points: u32,
    /// Seed for reproducible option selection
    #[arg(long)]
    seed: Option<u64>,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Export(cmd) => run_export(&cmd.campaign, cmd.output.as_deref()),
        Command::Load(cmd) => run_load(&cmd.page, cmd.output.as_deref()),
        Command::Preview(cmd) => run_preview(&cmd),
    };
    if let Err(err) = result {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

fn run_export(campaign_path: &Path, output: Option<&Path>) -> Result<()> {
    let campaign = read_campaign_toml(campaign_path)?;
    campaign
        .validate()
        .map_err(|err| anyhow::anyhow!("{} ({})", err, campaign_path.display()))?;

    let out_path = match output {
        Some(path) => path.to_path_buf(),
        None => default_output_path(campaign_path, "html"),
    };
    let html = encode(&campaign);
    fs::write(&out_path, html)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    log_debug(&format!("exported campaign to {}", out_path.display()));
    println!("wrote {}", out_path.display());
    Ok(())
}

fn run_load(page_path: &Path, output: Option<&Path>) -> Result<()> {
    let text = fs::read_to_string(page_path)
        .with_context(|| format!("failed to read {}", page_path.display()))?;
    if !looks_like_html(page_path, &text) {
        bail!(
            "{} does not look like an HTML page; only exported pages can be loaded",
            page_path.display()
        );
    }

    let decoded = decode(&text);
    report_warnings(&decoded);

    let toml_text = toml::to_string_pretty(&decoded.campaign)
        .context("failed to serialize the loaded campaign")?;
    match output {
        Some(path) => {
            fs::write(path, toml_text)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("wrote {}", path.display());
        }
        None => print!("{}", toml_text),
    }
    Ok(())
}

fn run_preview(cmd: &PreviewCmd) -> Result<()> {
    let campaign = if cmd
        .input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
    {
        read_campaign_toml(&cmd.input)?
    } else {
        let text = fs::read_to_string(&cmd.input)
            .with_context(|| format!("failed to read {}", cmd.input.display()))?;
        let decoded = decode(&text);
        report_warnings(&decoded);
        decoded.campaign
    };

    let env = ClientEnv {
        user_agent: cmd.user_agent.clone().unwrap_or_default(),
        platform: cmd.platform.clone().unwrap_or_default(),
        max_touch_points: cmd.touch_points,
    };
    let mut rng = match cmd.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    let prepared = prepare_mail(&campaign, &env, &mut rng)?;

    println!("platform: {:?}", prepared.platform);
    println!(
        "encoding profile: {}",
        match prepared.profile {
            EncodingProfile::Standard => "standard",
            EncodingProfile::IosSpecific => "ios_specific",
        }
    );
    println!();
    print!(
        "{}",
        copy_text(&campaign, &prepared.selection, &prepared.body_text)
    );
    println!();
    println!();
    match (&prepared.link, &prepared.unavailable) {
        (Some(link), _) => {
            println!("mailto: {}", link);
            if let Some(length) = prepared.length {
                if length.over_limit {
                    println!(
                        "warning: link is {} characters; some clients truncate past {}",
                        length.length,
                        mailweave_link::MAILTO_SOFT_LIMIT
                    );
                } else {
                    println!("link length: {} characters", length.length);
                }
            }
        }
        (None, Some(reason)) => println!("send disabled: {}", reason),
        (None, None) => println!("send disabled"),
    }
    Ok(())
}

fn read_campaign_toml(path: &Path) -> Result<Campaign> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let campaign: Campaign = toml::from_str(&text)
        .with_context(|| format!("{} is not a valid campaign file", path.display()))?;
    Ok(campaign.normalized())
}

fn report_warnings(decoded: &Decoded) {
    if decoded.script_block_missing() {
        eprintln!(
            "notice: the embedded script block was not found; the campaign could only be \
             partially populated"
        );
        return;
    }
    for warning in &decoded.warnings {
        eprintln!("warning: {}", warning);
    }
}

fn default_output_path(input: &Path, extension: &str) -> PathBuf {
    input.with_extension(extension)
}

/// Mirrors the editor's upload-type check: accept by extension, or by a
/// leading doctype/html tag for files without one.
fn looks_like_html(path: &Path, content: &str) -> bool {
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
    {
        return true;
    }
    let head = content.trim_start().get(..15).unwrap_or(content.trim_start());
    let head = head.to_ascii_lowercase();
    head.starts_with("<!doctype") || head.starts_with("<html")
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use mailweave_core::Campaign;

    use super::{default_output_path, looks_like_html, read_campaign_toml, run_export, run_load};

    const CAMPAIGN_TOML: &str = r#"
page_title = "Write To Your MP"
to_addresses = ["mp@parliament.example"]
cc_addresses = ["cc@org.example"]
bcc_address = "tracker@org.example"
subject_lines = ["Please act", "Action needed"]
para1_options = ["Dear MP,"]
para2_options = ["I am concerned."]
para3_options = ["Please respond."]
signing_off_options = ["Yours,"]
"#;

    #[test]
    fn default_output_swaps_extension() {
        assert_eq!(
            default_output_path(Path::new("campaign.toml"), "html"),
            Path::new("campaign.html")
        );
    }

    #[test]
    fn html_sniffing_accepts_extension_or_leading_markup() {
        assert!(looks_like_html(Path::new("page.html"), ""));
        assert!(looks_like_html(Path::new("page.HTM"), ""));
        assert!(looks_like_html(
            Path::new("page.txt"),
            "\n  <!DOCTYPE html><html>"
        ));
        assert!(looks_like_html(Path::new("page"), "<html lang=\"en\">"));
        assert!(!looks_like_html(Path::new("page.txt"), "just some text"));
    }

    #[test]
    fn export_then_load_round_trips_through_files() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let campaign_path = dir.path().join("campaign.toml");
        let page_path = dir.path().join("campaign.html");
        let reloaded_path = dir.path().join("reloaded.toml");
        fs::write(&campaign_path, CAMPAIGN_TOML)?;

        run_export(&campaign_path, None)?;
        assert!(page_path.exists(), "export should default to .html sibling");

        run_load(&page_path, Some(&reloaded_path))?;
        let original = read_campaign_toml(&campaign_path)?;
        let reloaded = read_campaign_toml(&reloaded_path)?;
        assert_eq!(reloaded, original);
        Ok(())
    }

    #[test]
    fn export_refuses_invalid_campaign_and_writes_nothing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let campaign_path = dir.path().join("campaign.toml");
        fs::write(
            &campaign_path,
            CAMPAIGN_TOML.replace("subject_lines = [\"Please act\", \"Action needed\"]", ""),
        )?;

        let err = run_export(&campaign_path, None).unwrap_err();
        assert!(
            err.to_string().contains("Subject Line"),
            "unexpected error: {}",
            err
        );
        assert!(!dir.path().join("campaign.html").exists());
        Ok(())
    }

    #[test]
    fn load_rejects_non_html_input() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, "not markup at all")?;
        let err = run_load(&path, None).unwrap_err();
        assert!(err.to_string().contains("does not look like an HTML page"));
        Ok(())
    }

    #[test]
    fn campaign_toml_entries_are_normalized_on_read() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("campaign.toml");
        fs::write(
            &path,
            CAMPAIGN_TOML.replace(
                "subject_lines = [\"Please act\", \"Action needed\"]",
                "subject_lines = [\"  Please act  \", \"   \"]",
            ),
        )?;
        let campaign: Campaign = read_campaign_toml(&path)?;
        assert_eq!(campaign.subject_lines, vec!["Please act"]);
        Ok(())
    }
}
