//! NATS request/reply inbox for the engine's inbound operations.
//!
//! The command layer sends one JSON [`Operation`] per request on
//! `peatnet.ops` and gets one JSON [`Reply`] back on the request's reply
//! subject. Each request is handled on its own task, so a slow operation
//! (or one waiting on a row lock) never blocks the others.
//!
//! Game outcomes come back as `{"status": "error", "kind": ...}` with the
//! engine's message. Store failures are logged here and reported with a
//! generic message only.

use futures::StreamExt as _;
use peatnet_core::{Engine, EngineError, EntityStore};
use peatnet_types::{CaseId, ChatId, CourtType, RemediationAction, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::AppError;

/// Subject the inbox listens on.
pub const OPS_SUBJECT: &str = "peatnet.ops";

/// Default page size for list queries.
const DEFAULT_LIMIT: usize = 10;

/// Largest page a list query may ask for.
const MAX_LIMIT: usize = 100;

const fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// One inbound operation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Manual mining.
    Mine {
        /// Acting user.
        user_id: UserId,
        /// Chat the command came from.
        chat_id: ChatId,
    },
    /// Prospecting.
    Prospect {
        /// Acting user.
        user_id: UserId,
        /// Chat the command came from.
        chat_id: ChatId,
    },
    /// Daily fiber collection.
    CollectCellulose {
        /// Acting user.
        user_id: UserId,
    },
    /// Buy premium with primary.
    Exchange {
        /// Acting user.
        user_id: UserId,
        /// Premium units to buy.
        amount: i64,
    },
    /// Treat a perforation.
    TreatPerforation {
        /// Acting user.
        user_id: UserId,
    },
    /// Paid pH remediation.
    Remediate {
        /// Target chat.
        chat_id: ChatId,
        /// Paying user.
        user_id: UserId,
        /// What to apply.
        action: RemediationAction,
    },
    /// pH reading, optionally persisted.
    Diagnose {
        /// Target chat.
        chat_id: ChatId,
        /// Write the drifted reading back.
        #[serde(default)]
        persist: bool,
    },
    /// Join the chat's turtle defense.
    JoinDefense {
        /// Target chat.
        chat_id: ChatId,
        /// Defender.
        user_id: UserId,
    },
    /// Counter the chat's CO2 emission.
    CounterCo2 {
        /// Target chat.
        chat_id: ChatId,
        /// Acting user.
        user_id: UserId,
    },
    /// Sue another user.
    FileCourtCase {
        /// Which court.
        court_type: CourtType,
        /// Who files.
        plaintiff: UserId,
        /// Who is sued.
        defendant: UserId,
    },
    /// Look up a case.
    CaseStatus {
        /// Case id from the filing.
        case_id: CaseId,
    },
    /// A user's record and perforation risk.
    UserStatus {
        /// Target user.
        user_id: UserId,
    },
    /// Richest users.
    TopUsers {
        /// Page size.
        #[serde(default = "default_limit")]
        limit: usize,
    },
    /// Cases a user took part in.
    CourtHistory {
        /// Target user.
        user_id: UserId,
        /// Page size.
        #[serde(default = "default_limit")]
        limit: usize,
    },
    /// A user's economy log.
    MiningHistory {
        /// Target user.
        user_id: UserId,
        /// Page size.
        #[serde(default = "default_limit")]
        limit: usize,
    },
}

impl Operation {
    /// Tag used in logs.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Mine { .. } => "mine",
            Self::Prospect { .. } => "prospect",
            Self::CollectCellulose { .. } => "collect_cellulose",
            Self::Exchange { .. } => "exchange",
            Self::TreatPerforation { .. } => "treat_perforation",
            Self::Remediate { .. } => "remediate",
            Self::Diagnose { .. } => "diagnose",
            Self::JoinDefense { .. } => "join_defense",
            Self::CounterCo2 { .. } => "counter_co2",
            Self::FileCourtCase { .. } => "file_court_case",
            Self::CaseStatus { .. } => "case_status",
            Self::UserStatus { .. } => "user_status",
            Self::TopUsers { .. } => "top_users",
            Self::CourtHistory { .. } => "court_history",
            Self::MiningHistory { .. } => "mining_history",
        }
    }
}

/// Answer to one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Reply {
    /// The operation succeeded.
    Ok {
        /// Operation-specific payload.
        result: serde_json::Value,
    },
    /// The operation failed.
    Error {
        /// Stable error tag.
        kind: &'static str,
        /// Human-readable detail.
        message: String,
        /// Whether the caller should show the message to the user.
        user_facing: bool,
    },
}

impl Reply {
    fn internal() -> Self {
        Self::Error {
            kind: "internal",
            message: "internal error".to_owned(),
            user_facing: false,
        }
    }

    fn malformed(err: &serde_json::Error) -> Self {
        Self::Error {
            kind: "malformed_request",
            message: err.to_string(),
            user_facing: false,
        }
    }
}

impl From<&EngineError> for Reply {
    fn from(err: &EngineError) -> Self {
        if err.is_user_facing() {
            Self::Error {
                kind: err.kind(),
                message: err.to_string(),
                user_facing: true,
            }
        } else {
            Self::internal()
        }
    }
}

fn reply<T: Serialize>(op: &'static str, outcome: Result<T, EngineError>) -> Reply {
    match outcome {
        Ok(value) => match serde_json::to_value(value) {
            Ok(result) => Reply::Ok { result },
            Err(err) => {
                error!(op, error = %err, "failed to serialize result");
                Reply::internal()
            }
        },
        Err(err) => {
            if err.is_user_facing() {
                debug!(op, kind = err.kind(), "operation refused");
            } else {
                error!(op, error = %err, "operation failed");
            }
            Reply::from(&err)
        }
    }
}

/// Run one operation against the engine.
pub async fn execute<S: EntityStore>(engine: &Engine<S>, op: Operation) -> Reply {
    let name = op.name();
    match op {
        Operation::Mine { user_id, chat_id } => reply(name, engine.mine(user_id, chat_id).await),
        Operation::Prospect { user_id, chat_id } => {
            reply(name, engine.prospect(user_id, chat_id).await)
        }
        Operation::CollectCellulose { user_id } => {
            reply(name, engine.collect_cellulose(user_id).await)
        }
        Operation::Exchange { user_id, amount } => {
            reply(name, engine.exchange(user_id, amount).await)
        }
        Operation::TreatPerforation { user_id } => {
            reply(name, engine.treat_perforation(user_id).await)
        }
        Operation::Remediate {
            chat_id,
            user_id,
            action,
        } => reply(name, engine.remediate(chat_id, user_id, action).await),
        Operation::Diagnose { chat_id, persist } => {
            reply(name, engine.diagnose_chat(chat_id, persist).await)
        }
        Operation::JoinDefense { chat_id, user_id } => {
            reply(name, engine.join_defense(chat_id, user_id).await)
        }
        Operation::CounterCo2 { chat_id, user_id } => {
            reply(name, engine.counter_co2(chat_id, user_id).await)
        }
        Operation::FileCourtCase {
            court_type,
            plaintiff,
            defendant,
        } => reply(
            name,
            engine.file_court_case(court_type, plaintiff, defendant).await,
        ),
        Operation::CaseStatus { case_id } => reply(name, engine.case_status(case_id).await),
        Operation::UserStatus { user_id } => reply(name, engine.user_status(user_id).await),
        Operation::TopUsers { limit } => {
            reply(name, engine.top_users(limit.min(MAX_LIMIT)).await)
        }
        Operation::CourtHistory { user_id, limit } => reply(
            name,
            engine.court_history(user_id, limit.min(MAX_LIMIT)).await,
        ),
        Operation::MiningHistory { user_id, limit } => reply(
            name,
            engine.mining_history(user_id, limit.min(MAX_LIMIT)).await,
        ),
    }
}

/// Decode a request payload and run it.
pub async fn handle_payload<S: EntityStore>(engine: &Engine<S>, payload: &[u8]) -> Reply {
    match serde_json::from_slice::<Operation>(payload) {
        Ok(op) => execute(engine, op).await,
        Err(err) => {
            warn!(error = %err, "malformed operation request");
            Reply::malformed(&err)
        }
    }
}

async fn respond<S: EntityStore>(
    engine: Engine<S>,
    client: async_nats::Client,
    message: async_nats::Message,
) {
    let Some(reply_to) = message.reply else {
        warn!(subject = %message.subject, "operation request without a reply subject dropped");
        return;
    };
    let answer = handle_payload(&engine, &message.payload).await;
    let bytes = match serde_json::to_vec(&answer) {
        Ok(bytes) => bytes,
        Err(err) => {
            error!(error = %err, "failed to serialize reply");
            return;
        }
    };
    if let Err(err) = client.publish(reply_to, bytes.into()).await {
        warn!(error = %err, "failed to send reply");
    }
}

/// Serve operations until shutdown is signalled.
///
/// # Errors
///
/// Returns [`AppError::Nats`] if the subscription cannot be created.
pub async fn serve<S: EntityStore>(
    engine: Engine<S>,
    client: async_nats::Client,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let mut requests = client
        .subscribe(OPS_SUBJECT)
        .await
        .map_err(|e| AppError::Nats {
            message: format!("failed to subscribe to {OPS_SUBJECT}: {e}"),
        })?;
    info!(subject = OPS_SUBJECT, "operation inbox listening");

    loop {
        tokio::select! {
            next = requests.next() => {
                let Some(message) = next else { break };
                tokio::spawn(respond(engine.clone(), client.clone(), message));
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    if let Err(err) = requests.unsubscribe().await {
        warn!(error = %err, "failed to unsubscribe operation inbox");
    }
    info!("operation inbox stopped");
    Ok(())
}
