use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};

use crate::annotate::{self, AnnotateOptions, AnnotatedText, StatusContext};
use crate::cache::{self, EmojiCache};
use crate::config::{self, Config};
use crate::emoji::{self, EmojiFetcher};
use crate::merge::KnownMentions;
use crate::progress::TripTimes;
use crate::refresh;
use crate::render::{self, Renderer, Theme};

pub const USAGE: &str = "trwl-status - annotate check-in status text\n\n\
USAGE:\n  \
trwl-status annotate <text> [--mention NAME]... [--profile URL | --host HOST] [--offline] [--json]\n  \
trwl-status emojis <host> [query] [--offline]\n  \
trwl-status refresh <host>\n  \
trwl-status cached\n  \
trwl-status progress <departure> <arrival> [--now TIME]\n\n\
FLAGS:\n  \
--version, -V        Show version and exit\n  \
--help,    -h        Show this help message";

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_with_args(&args, &mut out)
}

pub fn run_with_args(args: &[String], out: &mut dyn Write) -> Result<()> {
    let Some((command, rest)) = args.split_first() else {
        writeln!(out, "{USAGE}")?;
        return Ok(());
    };

    match command.as_str() {
        "annotate" => annotate_command(rest, out),
        "emojis" => emojis_command(rest, out),
        "refresh" => refresh_command(rest, out),
        "progress" => progress_command(rest, out),
        "cached" => cached_command(out),
        other => bail!("unknown command {other:?}\n\n{USAGE}"),
    }
}

#[derive(Debug, Default)]
struct AnnotateArgs {
    text: Option<String>,
    mentions: Vec<String>,
    profile: Option<String>,
    host: Option<String>,
    offline: bool,
    json: bool,
}

fn parse_annotate_args(args: &[String]) -> Result<AnnotateArgs> {
    let mut parsed = AnnotateArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--mention" | "-m" => parsed.mentions.push(flag_value(&mut iter, arg)?),
            "--profile" => parsed.profile = Some(flag_value(&mut iter, arg)?),
            "--host" => parsed.host = Some(flag_value(&mut iter, arg)?),
            "--offline" => parsed.offline = true,
            "--json" => parsed.json = true,
            _ if parsed.text.is_none() => parsed.text = Some(arg.clone()),
            _ => bail!("unexpected argument {arg:?}"),
        }
    }
    Ok(parsed)
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| anyhow!("{flag} requires a value"))
}

fn annotate_command(args: &[String], out: &mut dyn Write) -> Result<()> {
    let args = parse_annotate_args(args)?;
    let text = args.text.context("annotate: status text required")?;
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let cache = open_cache(&cfg)?;

    let known = KnownMentions::new(args.mentions);
    let context = match args.host {
        Some(host) => StatusContext::new(known, Some(host)),
        None => StatusContext::from_profile_url(known, args.profile.as_deref()),
    };

    let options = AnnotateOptions {
        emoji_size: cfg.render.emoji_size,
    };
    let annotated = match context.author_host.as_deref() {
        Some(host) if !args.offline => {
            annotate_online(&cfg, cache.clone(), host, &text, &context, &options)?
        }
        _ => annotate::annotate(&text, &context, cache.as_ref(), &options),
    };

    if args.json {
        let encoded =
            serde_json::to_string_pretty(&annotated).context("encode annotated text")?;
        writeln!(out, "{encoded}")?;
        return Ok(());
    }

    let renderer = Renderer::new(Theme::with_mention_color(&cfg.render.mention_color));
    writeln!(out, "{}", render::to_plain(&renderer.render(&annotated)))?;
    for annotation in annotated.annotations() {
        writeln!(out, "  {} {} @{:?}", annotation.tag, annotation.payload, annotation.range)?;
    }
    for (key, image) in annotated.inline_content() {
        writeln!(out, "  :{key}: -> {} ({}x{})", image.url, image.width, image.height)?;
    }
    Ok(())
}

fn annotate_online(
    cfg: &Config,
    cache: Arc<EmojiCache>,
    host: &str,
    text: &str,
    context: &StatusContext,
    options: &AnnotateOptions,
) -> Result<AnnotatedText> {
    let fetcher: Arc<dyn EmojiFetcher> = Arc::new(http_client(cfg)?);
    let manager = refresh::Manager::new(cache.clone(), fetcher, cfg.emoji.workers);

    let first = annotate::annotate(text, context, &manager, options);
    if first.refresh_requested().is_none() {
        return Ok(first);
    }

    // Bounded wait, then rebuild from the cache.
    if !manager.wait_idle(host, cfg.emoji.timeout * 2) {
        tracing::warn!(host, "timed out waiting for custom emoji");
        manager.abandon();
        return Ok(first);
    }
    if !cache.is_fresh(host) {
        tracing::warn!(host, "custom emoji unavailable");
    }
    Ok(annotate::annotate(text, context, cache.as_ref(), options))
}

fn emojis_command(args: &[String], out: &mut dyn Write) -> Result<()> {
    let offline = args.iter().any(|arg| arg == "--offline");
    let mut positional = args.iter().filter(|arg| !arg.starts_with("--"));
    let host = positional.next().context("emojis: host required")?;
    let query = positional.next().map(String::as_str).unwrap_or("");

    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let cache = open_cache(&cfg)?;
    if !offline && !cache.is_fresh(host) {
        cache
            .refresh(host, &http_client(&cfg)?)
            .with_context(|| format!("fetch custom emoji of {host}"))?;
    }

    let listing = cache.get(host).unwrap_or_default();
    for emoji in emoji::search(&listing, query) {
        writeln!(out, ":{}:\t{}", emoji.shortcode, emoji.url)?;
    }
    Ok(())
}

fn refresh_command(args: &[String], out: &mut dyn Write) -> Result<()> {
    let host = args.first().context("refresh: host required")?;
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let cache = open_cache(&cfg)?;
    let emojis = cache
        .refresh(host, &http_client(&cfg)?)
        .with_context(|| format!("refresh custom emoji of {host}"))?;
    writeln!(out, "stored {} custom emoji for {host}", emojis.len())?;
    Ok(())
}

fn cached_command(out: &mut dyn Write) -> Result<()> {
    let cfg = config::load(config::LoadOptions::default()).context("load config")?;
    let cache = open_cache(&cfg)?;
    let today = cache.today();
    for host in cache.hosts() {
        let Some(entry) = cache.entry(&host) else {
            continue;
        };
        let state = if entry.is_stale(today) { "stale" } else { "fresh" };
        writeln!(
            out,
            "{host}\tday {}\t{} emoji\t{state}",
            entry.fetched_day.0,
            entry.emojis.len()
        )?;
    }
    Ok(())
}

fn progress_command(args: &[String], out: &mut dyn Write) -> Result<()> {
    let mut positional = Vec::new();
    let mut now = Utc::now();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--now" => now = parse_time(&flag_value(&mut iter, arg)?)?,
            _ => positional.push(arg.as_str()),
        }
    }
    let [departure, arrival] = positional.as_slice() else {
        bail!("progress: expected <departure> <arrival>");
    };

    let trip = TripTimes {
        departure_planned: parse_time(departure)?,
        departure_real: None,
        departure_manual: None,
        arrival_planned: parse_time(arrival)?,
        arrival_real: None,
    };
    writeln!(
        out,
        "progress {:.0}%, {} min to arrival",
        trip.fraction(now) * 100.0,
        trip.minutes_to_arrival(now)
    )?;
    Ok(())
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|time| time.with_timezone(&Utc))
        .with_context(|| format!("parse {value:?} as RFC 3339 time"))
}

fn open_cache(cfg: &Config) -> Result<Arc<EmojiCache>> {
    let cache = EmojiCache::open(cache::Options {
        dir: cfg.emoji.cache_dir.clone(),
        clock: None,
    })
    .context("open emoji cache")?;
    Ok(Arc::new(cache))
}

fn http_client(cfg: &Config) -> Result<emoji::Client> {
    emoji::Client::new(emoji::ClientConfig {
        user_agent: cfg.emoji.user_agent.clone(),
        timeout: Some(cfg.emoji.timeout),
        http_client: None,
        scheme: None,
    })
    .context("build emoji http client")
}
