//! Channel-to-topic resolution strategies
//!
//! Application code addresses logical channels; a [`TopicStrategy`] maps a
//! channel onto the addressing scheme of the concrete transport: topic name,
//! partition index, message key and partition count. Two variants exist and
//! callers pick one by configuration:
//!
//! - [`PerChannelStrategy`]: one topic per channel, single partition. Simple
//!   deployments and backward compatibility.
//! - [`GroupedStrategy`]: an ordered pattern table collapses many channels
//!   onto few topics, with deterministic hash partitioning so one channel
//!   always lands on one partition (intra-channel ordering on partitioned
//!   transports).
//!
//! The mapping table is read-only after construction and safe to share
//! across any number of producers and consumers.

use crate::config::TopicMappingConfig;
use crate::error::{BrokerError, ChannelError};
use crate::Result;
use regex::Regex;
use std::collections::HashSet;

/// Maximum accepted channel-name length, matching common broker topic limits.
const MAX_CHANNEL_LEN: usize = 249;

/// Channel resolution strategy; a closed set of variants selected by
/// configuration.
#[derive(Debug, Clone)]
pub enum TopicStrategy {
    PerChannel(PerChannelStrategy),
    Grouped(GroupedStrategy),
}

impl TopicStrategy {
    /// One sanitized, prefixed topic per channel.
    pub fn per_channel<P: Into<String>>(prefix: P) -> Self {
        Self::PerChannel(PerChannelStrategy {
            prefix: prefix.into(),
        })
    }

    /// Pattern-table grouping with a default-topic fallback.
    pub fn grouped(config: &TopicMappingConfig) -> Result<Self> {
        Ok(Self::Grouped(GroupedStrategy::new(config)?))
    }

    /// Transport topic for a channel.
    pub fn topic_name(&self, channel: &str) -> String {
        match self {
            Self::PerChannel(s) => s.topic_name(channel),
            Self::Grouped(s) => s.topic_name(channel),
        }
    }

    /// Partition index for a channel given the topic's partition total.
    ///
    /// Deterministic: the same channel resolves to the same partition on
    /// every call and across strategy instances with identical config.
    pub fn partition(&self, channel: &str, total_partitions: u32) -> u32 {
        match self {
            Self::PerChannel(_) => 0,
            Self::Grouped(_) => {
                if total_partitions == 0 {
                    0
                } else {
                    fnv1a(channel) % total_partitions
                }
            }
        }
    }

    /// Message key for key-based transport partitioning.
    ///
    /// The grouped strategy keys by channel name so transports that partition
    /// by key agree with [`TopicStrategy::partition`]'s channel affinity.
    pub fn message_key(&self, channel: &str) -> Option<String> {
        match self {
            Self::PerChannel(_) => None,
            Self::Grouped(_) => Some(channel.to_string()),
        }
    }

    /// Partition count configured for the channel's topic.
    pub fn partition_count(&self, channel: &str) -> u32 {
        match self {
            Self::PerChannel(_) => 1,
            Self::Grouped(s) => s.partition_count(channel),
        }
    }

    /// Deduplicated topics covering a list of channels, in first-seen order.
    ///
    /// Used when a consumer subscribes to several logical channels that may
    /// collapse onto fewer physical topics.
    pub fn topics_for_channels<'a, I>(&self, channels: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        let mut topics = Vec::new();
        for channel in channels {
            let topic = self.topic_name(channel);
            if seen.insert(topic.clone()) {
                topics.push(topic);
            }
        }
        topics
    }
}

/// One topic per channel; no keys, no partitioning.
#[derive(Debug, Clone)]
pub struct PerChannelStrategy {
    prefix: String,
}

impl PerChannelStrategy {
    fn topic_name(&self, channel: &str) -> String {
        format!("{}{}", self.prefix, sanitize(channel))
    }
}

/// Replace characters the transports cannot carry in topic names.
fn sanitize(channel: &str) -> String {
    channel
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Ordered pattern table mapping channels onto shared topics.
#[derive(Debug, Clone)]
pub struct GroupedStrategy {
    mappings: Vec<CompiledMapping>,
    default_topic: String,
    default_partitions: u32,
}

#[derive(Debug, Clone)]
struct CompiledMapping {
    pattern: Regex,
    topic: String,
    partitions: u32,
}

impl GroupedStrategy {
    fn new(config: &TopicMappingConfig) -> Result<Self> {
        let mut mappings = Vec::with_capacity(config.mappings.len());
        for entry in &config.mappings {
            if entry.partitions == 0 {
                return Err(BrokerError::invalid_config(format!(
                    "mapping '{}' must have >= 1 partition",
                    entry.pattern
                )));
            }
            mappings.push(CompiledMapping {
                pattern: compile_pattern(&entry.pattern)?,
                topic: entry.topic.clone(),
                partitions: entry.partitions,
            });
        }
        if config.default_partitions == 0 {
            return Err(BrokerError::invalid_config("default_partitions must be >= 1"));
        }
        Ok(Self {
            mappings,
            default_topic: config.default_topic.clone(),
            default_partitions: config.default_partitions,
        })
    }

    fn lookup(&self, channel: &str) -> Option<&CompiledMapping> {
        self.mappings.iter().find(|m| m.pattern.is_match(channel))
    }

    fn topic_name(&self, channel: &str) -> String {
        self.lookup(channel)
            .map(|m| m.topic.clone())
            .unwrap_or_else(|| self.default_topic.clone())
    }

    fn partition_count(&self, channel: &str) -> u32 {
        self.lookup(channel)
            .map(|m| m.partitions)
            .unwrap_or(self.default_partitions)
    }
}

/// Translate a glob into an anchored regex.
///
/// Every character except `*` is escaped before the wildcard is expanded to
/// `.*`, so dots and any other regex metacharacter in a configured pattern
/// match themselves.
fn compile_pattern(pattern: &str) -> Result<Regex> {
    let mut expanded = String::with_capacity(pattern.len() + 2);
    expanded.push('^');
    for c in pattern.chars() {
        if c == '*' {
            expanded.push_str(".*");
        } else {
            expanded.push_str(&regex::escape(&c.to_string()));
        }
    }
    expanded.push('$');
    Regex::new(&expanded).map_err(|e| {
        BrokerError::invalid_config(format!("bad channel pattern '{}': {}", pattern, e))
    })
}

/// Validate a channel name at the publish boundary.
pub fn validate_channel(channel: &str) -> Result<()> {
    if channel.is_empty() {
        return Err(ChannelError::invalid_name(channel, "name is empty").into());
    }
    if channel.len() > MAX_CHANNEL_LEN {
        return Err(ChannelError::invalid_name(
            channel,
            format!("name exceeds {} characters", MAX_CHANNEL_LEN),
        )
        .into());
    }
    if let Some(bad) = channel
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(ChannelError::invalid_name(
            channel,
            format!("character '{}' is not allowed", bad),
        )
        .into());
    }
    Ok(())
}

/// FNV-1a over the channel name; deterministic across processes and
/// strategy instances.
fn fnv1a(channel: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in channel.as_bytes() {
        hash ^= *byte as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
