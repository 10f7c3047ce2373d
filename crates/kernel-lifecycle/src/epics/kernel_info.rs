//! `kernel_info` handshake run once per freshly launched kernel.

use log::{debug, warn};
use serde_json::Value;
use tokio::task::{JoinHandle, JoinSet};

use crate::actions::Action;
use crate::channel::KernelChannel;
use crate::epics::EpicContext;
use crate::error::ChannelError;
use crate::kernel::KernelInfo;
use crate::message::{ProtocolMessage, KERNEL_INFO_REPLY};
use crate::refs::{ContentRef, KernelRef};

/// Ask a kernel for its info and turn the reply into
/// `[SetLanguageInfo, SetKernelInfo]`.
///
/// The reply listener is subscribed before the request goes out. There is no
/// timeout: the caller decides how long to wait.
pub async fn acquire_kernel_info(
    channel: &KernelChannel,
    kernel_ref: KernelRef,
    content_ref: ContentRef,
) -> Result<[Action; 2], ChannelError> {
    let request = ProtocolMessage::kernel_info_request();
    let mut replies = channel.subscribe();
    channel.send(request.clone())?;

    while let Some(next) = replies.next().await {
        let message = next?;
        if !message.is_child_of(&request) || !message.is_type(KERNEL_INFO_REPLY) {
            continue;
        }

        let lang_info = message
            .content
            .get("language_info")
            .cloned()
            .unwrap_or(Value::Null);
        let info = KernelInfo::from_reply_content(&message.content);
        debug!(
            "[kernel-info] {} is {} {}",
            kernel_ref, info.implementation, info.language_name
        );

        return Ok([
            Action::SetLanguageInfo {
                kernel_ref,
                content_ref,
                lang_info,
            },
            Action::SetKernelInfo { kernel_ref, info },
        ]);
    }

    Err(ChannelError::Closed)
}

/// Run one independent handshake per `LaunchKernelSuccessful`.
pub fn spawn_acquire_kernel_info_epic(ctx: EpicContext) -> JoinHandle<()> {
    let mut actions = ctx.actions.subscribe();

    tokio::spawn(async move {
        let mut handshakes = JoinSet::new();

        loop {
            tokio::select! {
                action = actions.next() => {
                    let Some(action) = action else { break };
                    let Action::LaunchKernelSuccessful { kernel, kernel_ref, content_ref, .. } = action else {
                        continue;
                    };
                    let ctx = ctx.clone();
                    handshakes.spawn(async move {
                        match acquire_kernel_info(&kernel.channel, kernel_ref, content_ref).await {
                            Ok(pair) => ctx.emit_all(pair),
                            Err(e) => {
                                warn!("[kernel-info] Handshake with {} failed: {}", kernel_ref, e);
                            }
                        }
                    });
                }
                Some(_) = handshakes.join_next(), if !handshakes.is_empty() => {}
            }
        }

        handshakes.abort_all();
    })
}
