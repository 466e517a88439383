use crate::ssh::ConnectionContext;
use crate::storage::types::Direction;
use log::{error, info, warn};
use russh::server::Msg;
use russh::Channel;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::task::JoinSet;

const SESSION_ID_WAIT: Duration = Duration::from_secs(5);
const COPY_CHUNK: usize = 4096;

/// Argv a shell request runs, versus an exec request running `command`.
fn argv_for(command: Option<&str>) -> Vec<String> {
    match command {
        Some(cmd) => vec!["sh".to_string(), "-c".to_string(), cmd.to_string()],
        None => vec!["/bin/bash".to_string()],
    }
}

/// Spawned (never awaited) from the SSH `Handler`'s `shell_request`/
/// `exec_request` so window-change and other channel events keep flowing
/// while the interactive session runs. Ensures the session container
/// exists, opens the exec, installs the resize forwarder, and runs the two
/// copy-and-capture tasks until either side closes.
pub async fn spawn_bridge(
    ctx: Arc<ConnectionContext>,
    channel: Channel<Msg>,
    command: Option<String>,
) {
    let Some(session_id) = ctx.wait_session_id(SESSION_ID_WAIT).await else {
        error!("bridge gave up waiting for session id to resolve, closing channel");
        return;
    };

    let container_id = match ensure_container(&ctx, session_id).await {
        Ok(id) => id,
        Err(e) => {
            error!("could not provision container for session {session_id}: {e}");
            return;
        }
    };

    let pty = ctx.pty.lock().await.clone();
    let tty = pty.is_some();
    let (width, height) = pty.map(|p| (p.width, p.height)).unwrap_or((80, 24));
    let argv = argv_for(command.as_deref());

    let exec = match ctx
        .container_manager
        .open_exec(&container_id, argv, tty, width, height)
        .await
    {
        Ok(exec) => exec,
        Err(e) => {
            error!("failed to open exec for session {session_id}: {e}");
            return;
        }
    };
    let crate::container_management::ExecSession {
        exec_id,
        mut output_rx,
        input_tx,
        alive,
    } = exec;

    let (resize_tx, mut resize_rx) = tokio::sync::mpsc::channel::<(u16, u16)>(16);
    *ctx.resize_tx.lock().await = Some(resize_tx);

    let container_manager = ctx.container_manager.clone();
    let resize_task = tokio::spawn(async move {
        while let Some((w, h)) = resize_rx.recv().await {
            container_manager.resize(&exec_id, w, h).await;
        }
    });

    let stream = channel.into_stream();
    let (mut chan_read, mut chan_write) = tokio::io::split(stream);

    let gateway = ctx.gateway.clone();
    let ingress_alive = alive.clone();
    let gateway_in = gateway.clone();

    let mut tasks = JoinSet::new();

    tasks.spawn(async move {
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            if !ingress_alive.load(Ordering::Relaxed) {
                break;
            }
            match chan_read.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = buf[..n].to_vec();
                    if input_tx.send(chunk.clone()).await.is_err() {
                        break;
                    }
                    gateway_in.record_keystroke(session_id, Direction::Input, chunk);
                }
                Err(e) => {
                    warn!("bridge ingress read error for session {session_id}: {e}");
                    break;
                }
            }
        }
        ingress_alive.store(false, Ordering::Relaxed);
    });

    let egress_alive = alive.clone();
    let gateway_out = gateway.clone();
    tasks.spawn(async move {
        loop {
            match output_rx.recv().await {
                Some(data) => {
                    if chan_write.write_all(&data).await.is_err() {
                        break;
                    }
                    gateway_out.record_keystroke(session_id, Direction::Output, data);
                }
                None => break,
            }
        }
        egress_alive.store(false, Ordering::Relaxed);
        let _ = chan_write.shutdown().await;
    });

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            warn!("bridge task for session {session_id} panicked: {e}");
        }
    }

    alive.store(false, Ordering::Relaxed);
    resize_task.abort();
    ctx.resize_tx.lock().await.take();
    info!("bridge for session {session_id} ended");
}

async fn ensure_container(
    ctx: &Arc<ConnectionContext>,
    session_id: uuid::Uuid,
) -> Result<String, crate::error_handling::types::ContainerError> {
    let mut guard = ctx.container_id.lock().await;
    if let Some(id) = guard.as_ref() {
        return Ok(id.clone());
    }
    let id = ctx.container_manager.create(session_id).await?;
    *guard = Some(id.clone());
    drop(guard);
    ctx.session_manager.set_container(session_id, id.clone()).await;
    if let Err(e) = ctx.gateway.set_container(session_id, id.clone()).await {
        warn!("failed to persist container id for session {session_id}: {e}");
    }
    Ok(id)
}
