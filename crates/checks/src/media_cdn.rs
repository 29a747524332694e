//! Media CDN redirect and header check.
//!
//! Uploads a random image, posts it to a room and inspects what the
//! homeserver answers for the download URL: clients should be redirected to
//! the CDN (or not, depending on the deployment), Synapse itself must never
//! be, and configured response headers must carry the expected values.

use std::io::Cursor;

use anyhow::Context;
use clap::Parser;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use matrix_client::MatrixClient;
use probe::{Aggregator, CheckOutput, CleanupLedger, Severity};
use rand::Rng;
use reqwest::header::{HeaderMap, LOCATION, USER_AGENT};
use tracing::{debug, info};
use url::Url;

use crate::cli::{parse_bool_flag, split_single, BotArgs, TimeoutArg, Verbosity};
use crate::error::CheckError;

/// User agent of a Synapse fetching remote media
pub const SYNAPSE_USER_AGENT: &str = "Synapse/1.77.3";

const IMAGE_SIZE: u32 = 100;
const IMAGE_NAME: &str = "media-cdn-check.png";

#[derive(Debug, Clone, Parser)]
#[command(name = "check-media-cdn", version, about = "Check the media CDN redirect")]
pub struct MediaCdnArgs {
    #[command(flatten)]
    pub bot: BotArgs,

    /// Admin endpoint that will be called to purge media for this user
    #[arg(long)]
    pub admin_endpoint: String,

    /// The room the bot should send its test messages in
    #[arg(long)]
    pub room: String,

    /// The domain that should be present
    #[arg(long)]
    pub check_domain: String,

    /// If true, the server must respond with a redirect to the media CDN domain
    #[arg(long, default_value = "true", action = clap::ArgAction::Set, value_parser = parse_bool_flag)]
    pub media_cdn_redirect: bool,

    /// Headers that must be set to the given value, as `key=value`
    #[arg(long, num_args = 0..)]
    pub required_headers: Vec<String>,

    #[command(flatten)]
    pub timeout: TimeoutArg,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

/// Status and headers of one `HEAD` request.
#[derive(Debug, Clone)]
pub struct HeadResponse {
    pub status: u16,
    pub headers: HeaderMap,
}

impl HeadResponse {
    /// Host (and port) the `Location` header points at, if any.
    pub fn redirect_host(&self) -> Option<String> {
        let location = self.headers.get(LOCATION)?.to_str().ok()?;
        let url = Url::parse(location).ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    pub fn is_redirect(&self) -> bool {
        self.headers.contains_key(LOCATION)
    }
}

/// A random-noise PNG, so every run uploads new content.
pub fn random_png() -> Result<Vec<u8>, CheckError> {
    let mut rng = rand::thread_rng();
    let img = RgbaImage::from_fn(IMAGE_SIZE, IMAGE_SIZE, |_, _| {
        Rgba([rng.gen(), rng.gen(), rng.gen(), 255])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Split `key=value` items. Icinga may pass them as one space-separated
/// string.
pub fn parse_required_headers(items: Vec<String>) -> Result<Vec<(String, String)>, CheckError> {
    split_single(items)
        .into_iter()
        .map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| {
                    CheckError::InvalidArgument(format!("required header `{item}` is not key=value"))
                })
        })
        .collect()
}

/// Compare one response header (name matched case-insensitively) with its
/// expected value.
pub fn verify_header(headers: &HeaderMap, name: &str, expected: &str) -> (String, Severity) {
    match headers.get(name).map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()) {
        None => (
            format!("CRITICAL: missing header \"{name}\""),
            Severity::Critical,
        ),
        Some(value) if value == expected => (format!("OK: {name}: \"{value}\""), Severity::Ok),
        Some(value) => (
            format!("CRITICAL: {name} is not \"{expected}\", is \"{value}\""),
            Severity::Critical,
        ),
    }
}

/// Judge the download response.
///
/// `synapse_view` is the same request made with Synapse's user agent; it is
/// only consulted when a redirect is expected.
pub fn evaluate_download(
    client_view: &HeadResponse,
    synapse_view: Option<&HeadResponse>,
    expect_redirect: bool,
    check_domain: &str,
) -> Vec<(String, Severity)> {
    let mut findings = Vec::new();

    if client_view.status != 200 && !expect_redirect {
        findings.push((
            format!("CRITICAL: status code is \"{}\"", client_view.status),
            Severity::Critical,
        ));
    } else {
        findings.push((
            format!("OK: status code is \"{}\"", client_view.status),
            Severity::Ok,
        ));
    }

    if expect_redirect {
        match client_view.redirect_host() {
            Some(domain) if domain == check_domain => findings.push((
                format!("OK: media CDN domain is \"{domain}\""),
                Severity::Ok,
            )),
            Some(domain) => findings.push((
                format!("CRITICAL: redirect to media CDN domain is \"{domain}\""),
                Severity::Critical,
            )),
            None => findings.push((
                "CRITICAL: was not redirected to the media CDN domain.".to_string(),
                Severity::Critical,
            )),
        }

        match synapse_view {
            Some(view) if view.status == 200 => findings.push((
                "OK: Synapse user-agent is not redirected.".to_string(),
                Severity::Ok,
            )),
            Some(view) => findings.push((
                format!(
                    "CRITICAL: Synapse user-agent is redirected with status code {}",
                    view.status
                ),
                Severity::Critical,
            )),
            None => findings.push((
                "UNKNOWN: Synapse user-agent request was not made.".to_string(),
                Severity::Unknown,
            )),
        }
    } else if client_view.is_redirect() {
        findings.push((
            format!(
                "CRITICAL: received {} to {}",
                client_view.status,
                client_view.redirect_host().unwrap_or_default()
            ),
            Severity::Critical,
        ));
    } else {
        findings.push(("OK: was not redirected.".to_string(), Severity::Ok));
    }

    findings
}

/// Summary line first, then every finding, then cleanup warnings.
pub fn render(findings: Vec<(String, Severity)>, cleanup: &CleanupLedger) -> CheckOutput {
    let mut agg = Aggregator::new();
    for (message, severity) in findings {
        agg.push(message, severity);
    }
    agg.push_cleanup(cleanup);
    let (severity, lines) = agg.finish();

    let summary = if severity.is_ok() {
        "OK: media CDN is good.".to_string()
    } else {
        format!("{severity}: media CDN is bad.")
    };
    let mut output = CheckOutput::new(severity).line(summary);
    output.lines.extend(lines);
    output
}

async fn head(
    http: &reqwest::Client,
    url: &str,
    user_agent: Option<&str>,
) -> Result<HeadResponse, CheckError> {
    let mut request = http.head(url);
    if let Some(agent) = user_agent {
        request = request.header(USER_AGENT, agent);
    }
    let response = request.send().await?;
    Ok(HeadResponse {
        status: response.status().as_u16(),
        headers: response.headers().clone(),
    })
}

/// Upload, post and inspect the image. Returns the findings; everything
/// that needs undoing is recorded in `cleanup`.
pub async fn probe_media(
    client: &MatrixClient,
    args: &MediaCdnArgs,
    required: &[(String, String)],
    cleanup: &mut CleanupLedger,
) -> Result<Vec<(String, Severity)>, CheckError> {
    let room_id = client.join_room(&args.room).await?;

    let png = random_png()?;
    let size = png.len();
    let content_uri = client.upload(png, "image/png", IMAGE_NAME).await?;
    let event_id = match client
        .send_image(
            &room_id,
            &content_uri,
            IMAGE_NAME,
            "image/png",
            size,
            (IMAGE_SIZE, IMAGE_SIZE),
        )
        .await
    {
        Ok(event_id) => event_id,
        Err(e) => {
            return Ok(vec![(
                format!("CRITICAL: failed to send message.\n{e}"),
                Severity::Critical,
            )])
        }
    };
    info!(room_id = %room_id, event_id = %event_id, "test image posted");

    let result = inspect(client, args, required, &room_id, &event_id).await;

    cleanup
        .attempt(
            format!("redact {event_id}"),
            async {
                client
                    .redact(&room_id, &event_id, Some("media CDN check"))
                    .await
                    .map(drop)
            },
        )
        .await;

    result
}

async fn inspect(
    client: &MatrixClient,
    args: &MediaCdnArgs,
    required: &[(String, String)],
    room_id: &str,
    event_id: &str,
) -> Result<Vec<(String, Severity)>, CheckError> {
    let event = client.get_event(room_id, event_id).await?;
    let mxc = event
        .content_uri()
        .ok_or_else(|| CheckError::MissingData(format!("event {event_id} has no url")))?;
    let download_url = client.mxc_to_http(mxc)?;
    debug!(url = %download_url, "checking download");

    let http = reqwest::Client::builder()
        .timeout(args.timeout.timeout)
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let client_view = head(&http, &download_url, None).await?;
    let synapse_view = if args.media_cdn_redirect {
        Some(head(&http, &download_url, Some(SYNAPSE_USER_AGENT)).await?)
    } else {
        None
    };

    let mut findings = evaluate_download(
        &client_view,
        synapse_view.as_ref(),
        args.media_cdn_redirect,
        &args.check_domain,
    );
    for (name, expected) in required {
        findings.push(verify_header(&client_view.headers, name, expected));
    }
    Ok(findings)
}

pub async fn run(args: &MediaCdnArgs) -> anyhow::Result<CheckOutput> {
    let required = parse_required_headers(args.required_headers.clone())?;
    let client = args
        .bot
        .login(Some(args.timeout.timeout))
        .await
        .context("failed to log in")?;

    let mut cleanup = CleanupLedger::new();
    let findings = probe_media(&client, args, &required, &mut cleanup).await;

    cleanup
        .attempt(
            format!("purge media for {}", client.user_id()),
            async {
                let total = client.purge_user_media(&args.admin_endpoint).await?;
                debug!(total, "purged test media");
                Ok::<_, matrix_client::MatrixError>(())
            },
        )
        .await;

    Ok(render(findings?, &cleanup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use probe::CleanupOutcome;
    use reqwest::header::HeaderValue;

    fn view(status: u16, headers: &[(&'static str, &str)]) -> HeadResponse {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        HeadResponse {
            status,
            headers: map,
        }
    }

    #[test]
    fn test_random_png_is_png() {
        let bytes = random_png().unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (100, 100));
    }

    #[test]
    fn test_redirect_to_cdn() {
        let client = view(302, &[("location", "https://cdn.example.org/media/abc")]);
        let synapse = view(200, &[]);
        let findings = evaluate_download(&client, Some(&synapse), true, "cdn.example.org");
        assert!(findings.iter().all(|(_, s)| s.is_ok()), "{findings:?}");
        assert_eq!(findings[1].0, "OK: media CDN domain is \"cdn.example.org\"");
    }

    #[test]
    fn test_redirect_to_wrong_domain_and_synapse_redirected() {
        let client = view(302, &[("location", "https://elsewhere.example.org/abc")]);
        let synapse = view(302, &[("location", "https://cdn.example.org/abc")]);
        let findings = evaluate_download(&client, Some(&synapse), true, "cdn.example.org");
        assert_eq!(
            findings[1],
            (
                "CRITICAL: redirect to media CDN domain is \"elsewhere.example.org\"".to_string(),
                Severity::Critical
            )
        );
        assert_eq!(
            findings[2].0,
            "CRITICAL: Synapse user-agent is redirected with status code 302"
        );
    }

    #[test]
    fn test_missing_redirect() {
        let findings = evaluate_download(&view(200, &[]), Some(&view(200, &[])), true, "cdn.example.org");
        assert_eq!(
            findings[1].0,
            "CRITICAL: was not redirected to the media CDN domain."
        );
    }

    #[test]
    fn test_no_redirect_expected() {
        let ok = evaluate_download(&view(200, &[]), None, false, "cdn.example.org");
        assert_eq!(ok[1].0, "OK: was not redirected.");

        let redirected = evaluate_download(
            &view(301, &[("location", "https://cdn.example.org/x")]),
            None,
            false,
            "cdn.example.org",
        );
        assert_eq!(redirected[0].1, Severity::Critical);
        assert_eq!(redirected[1].0, "CRITICAL: received 301 to cdn.example.org");
    }

    #[test]
    fn test_verify_header_is_case_insensitive() {
        let headers = view(200, &[("synapse-media-server", "s3")]).headers;
        assert_eq!(
            verify_header(&headers, "Synapse-Media-Server", "s3"),
            ("OK: Synapse-Media-Server: \"s3\"".to_string(), Severity::Ok)
        );
        assert_eq!(
            verify_header(&headers, "synapse-media-server", "local").1,
            Severity::Critical
        );
        assert_eq!(
            verify_header(&headers, "x-missing", "1").0,
            "CRITICAL: missing header \"x-missing\""
        );
    }

    #[test]
    fn test_parse_required_headers() {
        let parsed =
            parse_required_headers(vec!["Synapse-Media-S3-Status=200 synapse-media-server=s3".into()])
                .unwrap();
        assert_eq!(
            parsed,
            vec![
                ("synapse-media-s3-status".to_string(), "200".to_string()),
                ("synapse-media-server".to_string(), "s3".to_string()),
            ]
        );
        assert!(parse_required_headers(vec!["novalue".into()]).is_err());
    }

    #[test]
    fn test_render_summary_first_and_purge_warning() {
        let mut ledger = CleanupLedger::new();
        ledger.record(CleanupOutcome::failure("purge media for @bot:example.org", "HTTP 403"));
        let out = render(
            vec![("OK: status code is \"302\"".to_string(), Severity::Ok)],
            &ledger,
        );
        assert_eq!(out.severity, Severity::Warning);
        assert_eq!(out.lines[0], "WARNING: media CDN is bad.");
        assert_eq!(out.lines[1], "OK: status code is \"302\"");
        assert!(out
            .lines
            .contains(&"purge media for @bot:example.org: HTTP 403".to_string()));
    }

    #[test]
    fn test_render_all_good() {
        let out = render(
            vec![("OK: was not redirected.".to_string(), Severity::Ok)],
            &CleanupLedger::new(),
        );
        assert_eq!(out.to_string(), "OK: media CDN is good.\nOK: was not redirected.");
    }
}
