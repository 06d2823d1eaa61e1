//! Redis-backed delivery state store
//!
//! Each delivery record is a hash at `<prefix>:<event_id>:<guest_id>` with the
//! fields `{email,chat}_{status,sent,message_id,delivered_at,deferred}` and
//! `notification_{status,error,updated_at}`. Commits run as one Lua script so
//! the sent-flag check and the write are atomic with respect to other workers.

use crate::store::{ChannelCommit, CommitResult, DeliveryStateStore, StoreError};
use crate::types::{
    ChannelRecord, ChannelStatus, DeliveryKey, DeliveryRecord, DeliveryState,
    NotificationChannel, NotificationStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ::redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::collections::HashMap;
use tracing::{debug, error, info};

pub const DEFAULT_KEY_PREFIX: &str = "match-delivery";

// ARGV: job failure ("" derives the aggregate), updated_at, then three counted
// sections: scope channels; outcomes as (channel, success flag, message id,
// delivered_at, deferred flag); failures as (channel, detail).
// Returns the channels whose sent write was skipped because they were already sent.
const COMMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local job_failure = ARGV[1]
local updated_at = ARGV[2]
local rejected = {}

local function is_sent(channel)
  return redis.call('HGET', key, channel .. '_sent') == 'true'
end

local idx = 3
local scope = {}
local scope_count = tonumber(ARGV[idx])
idx = idx + 1
for i = 1, scope_count do
  table.insert(scope, ARGV[idx])
  idx = idx + 1
end

local outcome_count = tonumber(ARGV[idx])
idx = idx + 1
for i = 1, outcome_count do
  local channel = ARGV[idx]
  local success = ARGV[idx + 1]
  local message_id = ARGV[idx + 2]
  local delivered_at = ARGV[idx + 3]
  local deferred = ARGV[idx + 4]
  idx = idx + 5

  if is_sent(channel) then
    if success == '1' then
      table.insert(rejected, channel)
    end
  elseif success == '1' then
    redis.call('HSET', key,
      channel .. '_status', 'sent',
      channel .. '_sent', 'true',
      channel .. '_delivered_at', delivered_at,
      channel .. '_deferred', deferred == '1' and 'true' or 'false')
    if message_id ~= '' then
      redis.call('HSET', key, channel .. '_message_id', message_id)
    else
      redis.call('HDEL', key, channel .. '_message_id')
    end
  else
    redis.call('HSET', key, channel .. '_status', 'failed')
  end
end

local status = 'failed'
local error_text = job_failure
if job_failure == '' then
  local delivered = 0
  for _, channel in ipairs(scope) do
    if is_sent(channel) then
      delivered = delivered + 1
    end
  end

  local outstanding = {}
  local failure_count = tonumber(ARGV[idx])
  idx = idx + 1
  for i = 1, failure_count do
    local channel = ARGV[idx]
    if not is_sent(channel) then
      table.insert(outstanding, channel .. ': ' .. ARGV[idx + 1])
    end
    idx = idx + 2
  end

  if delivered == 0 then
    status = 'failed'
  elseif #outstanding == 0 then
    status = 'sent'
  else
    status = 'partial'
  end
  error_text = table.concat(outstanding, '; ')
end

redis.call('HSET', key, 'notification_status', status, 'notification_updated_at', updated_at)
if error_text ~= '' then
  redis.call('HSET', key, 'notification_error', error_text)
else
  redis.call('HDEL', key, 'notification_error')
end
return rejected
"#;

/// Delivery state store on a shared Redis instance
#[derive(Clone)]
pub struct RedisDeliveryStore {
    connection_manager: ConnectionManager,
    key_prefix: String,
    commit_script: Script,
}

impl RedisDeliveryStore {
    /// Connect to Redis and prepare the commit script
    pub async fn new(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = Client::open(redis_url).map_err(|e| {
            error!("Invalid Redis URL: {}", e);
            StoreError::Redis(e)
        })?;

        let connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to connect to Redis: {}", e);
            StoreError::Unavailable(e.to_string())
        })?;

        let key_prefix = key_prefix.into();
        info!("✅ Connected delivery state store (prefix: {})", key_prefix);

        Ok(Self {
            connection_manager,
            key_prefix,
            commit_script: Script::new(COMMIT_SCRIPT),
        })
    }

    fn storage_key(&self, key: &DeliveryKey) -> String {
        key.storage_key(&self.key_prefix)
    }

    /// Load the full delivery record, `None` when no hash exists
    pub async fn load_record(&self, key: &DeliveryKey) -> Result<Option<DeliveryRecord>, StoreError> {
        let storage_key = self.storage_key(key);
        let mut conn = self.connection_manager.clone();

        let fields: HashMap<String, String> = conn.hgetall(&storage_key).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        let record = DeliveryRecord {
            email: parse_channel_record(&storage_key, NotificationChannel::Email, &fields)?,
            chat: parse_channel_record(&storage_key, NotificationChannel::Chat, &fields)?,
            notification_status: match fields.get("notification_status") {
                Some(value) => NotificationStatus::parse(value).ok_or_else(|| {
                    malformed(&storage_key, format!("unknown notification_status '{}'", value))
                })?,
                None => NotificationStatus::Unset,
            },
            notification_error: fields.get("notification_error").cloned(),
            notification_updated_at: parse_timestamp(
                &storage_key,
                fields.get("notification_updated_at"),
            )?,
        };

        Ok(Some(record))
    }
}

#[async_trait]
impl DeliveryStateStore for RedisDeliveryStore {
    async fn read_delivery_state(&self, key: &DeliveryKey) -> Result<DeliveryState, StoreError> {
        let storage_key = self.storage_key(key);
        let mut conn = self.connection_manager.clone();

        let (email_sent, chat_sent): (Option<String>, Option<String>) = ::redis::cmd("HMGET")
            .arg(&storage_key)
            .arg("email_sent")
            .arg("chat_sent")
            .query_async(&mut conn)
            .await?;

        let state = DeliveryState {
            email_sent: parse_flag(&storage_key, "email_sent", email_sent.as_deref())?,
            chat_sent: parse_flag(&storage_key, "chat_sent", chat_sent.as_deref())?,
        };
        debug!(%key, ?state, "Read delivery state");
        Ok(state)
    }

    async fn commit_channel_result(
        &self,
        key: &DeliveryKey,
        commit: &ChannelCommit,
    ) -> Result<CommitResult, StoreError> {
        let storage_key = self.storage_key(key);
        let mut conn = self.connection_manager.clone();

        let mut invocation = self.commit_script.prepare_invoke();
        invocation
            .key(&storage_key)
            .arg(commit.job_failure.as_deref().unwrap_or(""))
            .arg(commit.updated_at.to_rfc3339())
            .arg(commit.channels.len());

        for channel in &commit.channels {
            invocation.arg(channel.as_str());
        }

        invocation.arg(commit.outcomes.len());
        for outcome in &commit.outcomes {
            let delivered_at = outcome.delivered_at.unwrap_or(commit.updated_at);
            invocation
                .arg(outcome.channel.as_str())
                .arg(if outcome.success { "1" } else { "0" })
                .arg(outcome.provider_message_id.as_deref().unwrap_or(""))
                .arg(delivered_at.to_rfc3339())
                .arg(if outcome.deferred { "1" } else { "0" });
        }

        invocation.arg(commit.failures.len());
        for (channel, detail) in &commit.failures {
            invocation.arg(channel.as_str()).arg(detail);
        }

        let rejected: Vec<String> = invocation.invoke_async(&mut conn).await.map_err(|e| {
            error!(%key, "Delivery state commit failed: {}", e);
            StoreError::Redis(e)
        })?;

        let rejected = rejected
            .iter()
            .map(|name| parse_channel(&storage_key, name))
            .collect::<Result<Vec<_>, _>>()?;

        if !rejected.is_empty() {
            debug!(%key, ?rejected, "Conditional write rejected for already delivered channels");
        }
        Ok(CommitResult::from_rejected(rejected))
    }
}

fn malformed(storage_key: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Malformed {
        key: storage_key.to_string(),
        reason: reason.into(),
    }
}

fn parse_flag(storage_key: &str, field: &str, value: Option<&str>) -> Result<bool, StoreError> {
    match value {
        None | Some("") | Some("false") | Some("0") => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some(other) => Err(malformed(
            storage_key,
            format!("field {} holds non-boolean '{}'", field, other),
        )),
    }
}

fn parse_timestamp(
    storage_key: &str,
    value: Option<&String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value
        .filter(|s| !s.is_empty())
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| malformed(storage_key, format!("bad timestamp '{}': {}", s, e)))
        })
        .transpose()
}

fn parse_channel(storage_key: &str, name: &str) -> Result<NotificationChannel, StoreError> {
    NotificationChannel::ALL
        .into_iter()
        .find(|channel| channel.as_str() == name)
        .ok_or_else(|| malformed(storage_key, format!("unknown channel '{}'", name)))
}

fn parse_channel_record(
    storage_key: &str,
    channel: NotificationChannel,
    fields: &HashMap<String, String>,
) -> Result<ChannelRecord, StoreError> {
    let field = |suffix: &str| fields.get(&format!("{}_{}", channel.as_str(), suffix));

    let status = match field("status") {
        Some(value) => ChannelStatus::parse(value)
            .ok_or_else(|| malformed(storage_key, format!("unknown channel status '{}'", value)))?,
        None => ChannelStatus::Unsent,
    };

    Ok(ChannelRecord {
        status,
        sent: parse_flag(storage_key, "sent", field("sent").map(String::as_str))?,
        message_id: field("message_id").filter(|s| !s.is_empty()).cloned(),
        delivered_at: parse_timestamp(storage_key, field("delivered_at"))?,
        deferred: parse_flag(storage_key, "deferred", field("deferred").map(String::as_str))?,
    })
}
