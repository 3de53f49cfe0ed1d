//! Semantic validation for parsed configuration values
//!
//! Every violation is collected before failing; cross references between
//! pipelines, servers and topics are checked when the registry is built.

use super::types::{AppConfig, BindAddress, FrigateAddress};
use crate::error::{Error, Result};
use crate::topic_matcher::TopicMatcher;
use regex::Regex;
use std::sync::LazyLock;

pub const MIN_THREADS: usize = 1;
pub const MAX_THREADS: usize = 15;
const MAX_TOPIC_BYTES: usize = 65535;

static SLUG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:_[a-z0-9]+)*$").expect("valid slug regex"));

static IPV4_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{1,3}\.){3}\d{1,3}$").expect("valid ipv4 regex"));

static BIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d{1,3}\.){3}\d{1,3}:(\d{1,5})$").expect("valid bind regex"));

static HOST_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").expect("valid label regex")
});

static TLD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z]{2,63}$").expect("valid tld regex"));

/// Validate a parsed configuration.
///
/// Returns `Error::Config` listing every failure found.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    validate_bind(&config.bind, &mut errors);

    if !(MIN_THREADS..=MAX_THREADS).contains(&config.threads) {
        errors.push(format!(
            "threads must be between {} and {}, got {}",
            MIN_THREADS, MAX_THREADS, config.threads
        ));
    }

    if config.reload_interval_secs == 0 {
        errors.push("reload_interval_secs must be > 0".to_string());
    }

    validate_frigate(&config.frigate, &mut errors);

    if config.servers.is_empty() {
        errors.push("at least one server must be configured".to_string());
    }
    for (name, server) in &config.servers {
        let context = format!("server '{}'", name);
        if !is_slug(name) {
            errors.push(format!("{}: invalid slug, try '{}'", context, slugify(name)));
        }
        if !is_host(&server.host) {
            errors.push(format!(
                "{}: host '{}' is neither an IPv4 address nor a hostname",
                context, server.host
            ));
        }
        if server.port == 0 {
            errors.push(format!("{}: port must be between 1 and 65535", context));
        }
    }

    for (name, pipeline) in &config.pipelines {
        let context = format!("pipeline '{}'", name);
        if !is_slug(name) {
            errors.push(format!("{}: invalid slug, try '{}'", context, slugify(name)));
        }
        if !(0.0..=1.0).contains(&pipeline.threshold) {
            errors.push(format!(
                "{}: threshold must be between 0 and 1, got {}",
                context, pipeline.threshold
            ));
        }
        if let Some(model) = &pipeline.model {
            if model.trim().is_empty() {
                errors.push(format!("{}: model must not be empty", context));
            }
        }
        if let Some(topic) = &pipeline.result_topic {
            if let Err(reason) = validate_publish_topic(topic) {
                errors.push(format!("{}: result_topic '{}': {}", context, topic, reason));
            }
        }
        if let Some(filter) = &pipeline.filter {
            if filter.trim().is_empty() {
                errors.push(format!("{}: filter must not be empty", context));
            }
        }
    }

    for (index, topic) in config.topics.iter().enumerate() {
        if let Err(reason) = validate_subscribe_topic(&topic.subscribe) {
            errors.push(format!(
                "topics[{}]: subscribe '{}': {}",
                index, topic.subscribe, reason
            ));
        }
        if topic.pipelines.is_empty() {
            errors.push(format!("topics[{}]: at least one pipeline is required", index));
        }
    }

    if !errors.is_empty() {
        return Err(Error::Config(format!(
            "Config validation failed:\n  - {}",
            errors.join("\n  - ")
        )));
    }

    Ok(())
}

fn validate_bind(bind: &BindAddress, errors: &mut Vec<String>) {
    let addr = bind.to_addr();
    match BIND_RE.captures(&addr) {
        Some(caps) => {
            let port_ok = caps[1].parse::<u32>().is_ok_and(|p| (1..=65535).contains(&p));
            if !port_ok {
                errors.push(format!("bind: port out of range in '{}'", addr));
            }
        }
        None => errors.push(format!("bind: '{}' is not an 'a.b.c.d:port' address", addr)),
    }
}

fn validate_frigate(frigate: &FrigateAddress, errors: &mut Vec<String>) {
    match frigate {
        FrigateAddress::Url(raw) => match reqwest::Url::parse(raw.trim()) {
            Ok(url) => {
                if !matches!(url.scheme(), "http" | "https") {
                    errors.push(format!("frigate: unsupported scheme in '{}'", raw));
                }
                if url.host_str().is_none() {
                    errors.push(format!("frigate: missing host in '{}'", raw));
                }
                if !matches!(url.path(), "" | "/") || url.query().is_some() {
                    errors.push(format!("frigate: url '{}' must not have a path", raw));
                }
            }
            Err(e) => errors.push(format!("frigate: invalid url '{}': {}", raw, e)),
        },
        FrigateAddress::Parts { host, port } => {
            if !is_host(host) {
                errors.push(format!(
                    "frigate: host '{}' is neither an IPv4 address nor a hostname",
                    host
                ));
            }
            if *port == 0 {
                errors.push("frigate: port must be between 1 and 65535".to_string());
            }
        }
    }
}

/// Name/filter checks shared by subscribe and publish topics
fn validate_topic(topic: &str) -> std::result::Result<(), String> {
    if topic.is_empty() {
        return Err("must not be empty".to_string());
    }
    if topic.len() > MAX_TOPIC_BYTES {
        return Err(format!("must not be longer than {} encoded bytes", MAX_TOPIC_BYTES));
    }
    for c in topic.chars() {
        if c == '\0' {
            return Err("must not contain the null character".to_string());
        }
        if c <= '\u{1f}' || ('\u{7f}'..='\u{9f}').contains(&c) {
            return Err("must not contain control characters".to_string());
        }
        let non_character = ('\u{fdd0}'..='\u{fdef}').contains(&c)
            || matches!(u32::from(c) & 0xFFFF, 0xFFFE | 0xFFFF);
        if non_character {
            return Err("must not contain non-characters".to_string());
        }
    }
    Ok(())
}

/// Valid MQTT subscription filter
pub fn validate_subscribe_topic(topic: &str) -> std::result::Result<(), String> {
    validate_topic(topic)?;
    TopicMatcher::compile(topic)
        .map(|_| ())
        .map_err(|e| match e {
            Error::Config(msg) => msg,
            other => other.to_string(),
        })
}

/// Valid MQTT topic name (no wildcards)
pub fn validate_publish_topic(topic: &str) -> std::result::Result<(), String> {
    validate_topic(topic)?;
    if topic.contains('+') || topic.contains('#') {
        return Err("wildcards are not allowed in topic names".to_string());
    }
    Ok(())
}

/// IPv4 dotted quad or hostname/FQDN
pub fn is_host(host: &str) -> bool {
    if IPV4_RE.is_match(host) {
        return host.split('.').all(|octet| octet.parse::<u8>().is_ok());
    }
    if host.is_empty() || host.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = host.split('.').collect();
    if !labels.iter().all(|label| HOST_LABEL_RE.is_match(label)) {
        return false;
    }
    match labels.as_slice() {
        [_] => true,
        [.., tld] => TLD_RE.is_match(tld),
        [] => false,
    }
}

pub fn is_slug(value: &str) -> bool {
    SLUG_RE.is_match(value)
}

/// Suggested slug for an invalid key
pub fn slugify(value: &str) -> String {
    let mut slug = String::new();
    for c in value.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
        } else if !slug.is_empty() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    if slug.is_empty() {
        "unknown".to_string()
    } else {
        slug.to_string()
    }
}
