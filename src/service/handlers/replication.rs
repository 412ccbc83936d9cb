use tracing::{debug, warn};

use crate::admission::Requirements;
use crate::connection::{Endpoint, NodeDescriptor};
use crate::error::{codes, CodecCause, Result, TxnError};
use crate::protocol::{Event, StatusCode};
use crate::replication::{decode_ack, decode_log, encode_ack, ReplicationContext, ReplicationVariant};
use crate::service::context::EventContext;
use crate::service::handler::InternalHandler;
use crate::stats::StatKind;
use crate::store::LogRecord;
use crate::types::{PartitionRole, ReplicationMode};

/// REPLICATION_LOG / REPLICATION_LOG2 on a backup
///
/// Validates and redoes every record, appends it to the local log, and
/// acknowledges synchronous replication in the variant it was sent with.
pub struct ReplicationLogHandler;

impl InternalHandler for ReplicationLogHandler {
    fn requirements(&self) -> Requirements {
        Requirements {
            partition_role: PartitionRole::BACKUP | PartitionRole::CATCHUP,
            ..Requirements::internal()
        }
    }

    fn handle(&self, ec: &mut EventContext<'_>, ev: &Event) -> Result<()> {
        let pid = ev.partition_id;
        let (header, log) = decode_log(ev)?;

        let current = ec.shared.partitions.cluster_version();
        if log.ack.cluster_version != current {
            return Err(TxnError::deny(
                codes::CLUSTER_VERSION_UNMATCH,
                format!(
                    "Cluster version unmatched (received={}, current={})",
                    log.ack.cluster_version, current
                ),
            ));
        }

        for raw in &log.records {
            let record = LogRecord::decode(raw)?;
            ec.shared.data.apply(&record)?;
            ec.shared.log.append(pid, raw)?;
        }
        ec.shared
            .stats
            .increment(pid, StatKind::Background, log.records.len() as u64);
        debug!(
            pid,
            repl_id = log.ack.repl_id,
            records = log.records.len(),
            "replication log applied"
        );

        if log.ack.repl_mode != ReplicationMode::Sync {
            return Ok(());
        }
        let variant = ReplicationVariant::of(ev.event_type).ok_or_else(|| {
            TxnError::decode(
                "replication log",
                CodecCause::InvalidTag {
                    what: "replication event type",
                    value: ev.event_type.code() as i64,
                },
            )
        })?;
        let ack = Event::new(
            pid,
            variant.ack_type(),
            NodeDescriptor::Server(ec.shared.self_node()),
            encode_ack(&log.ack, header.as_ref())?,
        );
        ec.transport().send(Endpoint::Transaction, &ev.sender, ack)
    }
}

/// REPLICATION_ACK / REPLICATION_ACK2 on the primary
pub struct ReplicationAckHandler;

impl InternalHandler for ReplicationAckHandler {
    fn handle(&self, ec: &mut EventContext<'_>, ev: &Event) -> Result<()> {
        let (_, ack) = decode_ack(ev)?;
        if let Some(done) = ec.worker.replication.receive_ack(ev.partition_id, &ack)? {
            finish_replication(ec, done, StatusCode::Success);
        }
        Ok(())
    }
}

/// Terminal action of a replication context: release the held reply and
/// the transaction context
pub(super) fn finish_replication(
    ec: &mut EventContext<'_>,
    ctx: ReplicationContext,
    status: StatusCode,
) {
    if let Some(reply) = &ctx.reply {
        if let Err(e) = reply.send(ec.transport(), status) {
            warn!(
                pid = ctx.partition_id,
                repl_id = ctx.repl_id,
                "replication reply failed: {}",
                e
            );
        }
    }
    ec.worker
        .txn
        .release_hold((ctx.partition_id, ctx.client_id), ctx.repl_id, ec.now);
    debug!(
        pid = ctx.partition_id,
        repl_id = ctx.repl_id,
        status = ?status,
        acks = ctx.received_acks,
        expected = ctx.expected_acks,
        "replication finished"
    );
}
