use crate::configuration::Config;
use crate::container_management::ContainerManager;
use crate::session_management::session::Credential;
use crate::session_management::session_manager::SessionManager;
use crate::ssh::connection_context::PtySize;
use crate::ssh::ConnectionContext;
use crate::storage::PersistenceGateway;
use async_trait::async_trait;
use log::{debug, info, warn};
use russh::keys::PublicKey;
use russh::server::{self, Auth, Msg};
use russh::{Channel, ChannelId, Disconnect, Pty};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

/// How long a connection has, after authenticating, to open its first
/// channel before the watchdog disconnects it.
const FIRST_CHANNEL_TIMEOUT: Duration = Duration::from_secs(20);

/// Factory `russh::server::Server` hands each accepted TCP connection to;
/// produces one `SshSession` per connection, all sharing the same
/// configuration, persistence gateway, container manager and session
/// registry.
#[derive(Clone)]
pub struct SshServer {
    config: Arc<Config>,
    gateway: Arc<dyn PersistenceGateway>,
    container_manager: Arc<ContainerManager>,
    session_manager: Arc<SessionManager>,
}

impl SshServer {
    pub fn new(
        config: Arc<Config>,
        gateway: Arc<dyn PersistenceGateway>,
        container_manager: Arc<ContainerManager>,
        session_manager: Arc<SessionManager>,
    ) -> Self {
        Self {
            config,
            gateway,
            container_manager,
            session_manager,
        }
    }
}

impl server::Server for SshServer {
    type Handler = SshSession;

    fn new_client(&mut self, peer_addr: Option<SocketAddr>) -> SshSession {
        let source_addr = peer_addr.unwrap_or_else(|| "0.0.0.0:0".parse().unwrap());
        info!("accepted connection from {source_addr}");
        SshSession {
            ctx: Arc::new(ConnectionContext::new(
                source_addr,
                self.config.clone(),
                self.gateway.clone(),
                self.container_manager.clone(),
                self.session_manager.clone(),
            )),
            channels: HashMap::new(),
        }
    }

    fn handle_session_error(&mut self, error: <Self::Handler as server::Handler>::Error) {
        warn!("session ended with error: {error}");
    }
}

/// One `russh::server::Handler` per accepted connection. Holds only the
/// open-channel bookkeeping a request needs to find its channel again;
/// everything else lives in the shared `ConnectionContext` so the shell
/// bridge task can outlive any single callback.
pub struct SshSession {
    ctx: Arc<ConnectionContext>,
    channels: HashMap<ChannelId, Option<Channel<Msg>>>,
}

impl SshSession {
    async fn start_session(&self, username: &str, credential: Credential) -> Auth {
        *self.ctx.username.lock().await = Some(username.to_string());
        *self.ctx.credential.lock().await = Some(credential.clone());

        match self
            .ctx
            .gateway
            .create_session(self.ctx.source_addr, username.to_string(), credential)
            .await
        {
            Ok(session_id) => {
                self.ctx.resolve_session_id(session_id);
                self.ctx
                    .session_manager
                    .register(session_id, self.ctx.source_addr)
                    .await;
                debug!("session {session_id} created for {username}@{}", self.ctx.source_addr);
                Auth::Accept
            }
            Err(e) => {
                warn!("failed to record session for {username}@{}: {e}", self.ctx.source_addr);
                Auth::Reject {
                    proceed_with_methods: None,
                }
            }
        }
    }
}

#[async_trait]
impl server::Handler for SshSession {
    type Error = crate::error_handling::types::ControllerError;

    async fn auth_none(&mut self, _user: &str) -> Result<Auth, Self::Error> {
        Ok(Auth::Reject {
            proceed_with_methods: None,
        })
    }

    /// Every password is accepted — this is a honeypot, not a gate.
    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        Ok(self
            .start_session(user, Credential::Password(password.to_string()))
            .await)
    }

    async fn auth_publickey(&mut self, user: &str, key: &PublicKey) -> Result<Auth, Self::Error> {
        let fingerprint = key.fingerprint(russh::keys::HashAlg::Sha256).to_string();
        Ok(self
            .start_session(user, Credential::PublicKeyFingerprint(fingerprint))
            .await)
    }

    async fn auth_succeeded(&mut self, session: &mut server::Session) -> Result<(), Self::Error> {
        *self.ctx.handle.lock().await = Some(session.handle());

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(FIRST_CHANNEL_TIMEOUT).await;
            if ctx.first_channel_opened.load(Ordering::SeqCst) {
                return;
            }
            if let Some(handle) = ctx.handle.lock().await.as_ref() {
                warn!(
                    "connection from {} opened no channel within {:?}, disconnecting",
                    ctx.source_addr, FIRST_CHANNEL_TIMEOUT
                );
                let _ = handle
                    .disconnect(Disconnect::ByApplication, "idle", "")
                    .await;
            }
        });

        Ok(())
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut server::Session,
    ) -> Result<bool, Self::Error> {
        self.ctx.first_channel_opened.store(true, Ordering::SeqCst);
        self.channels.insert(channel.id(), Some(channel));
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel: ChannelId,
        _term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        *self.ctx.pty.lock().await = Some(PtySize {
            width: col_width as u16,
            height: row_height as u16,
        });
        session.channel_success(channel);
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        let size = PtySize {
            width: col_width as u16,
            height: row_height as u16,
        };
        *self.ctx.pty.lock().await = Some(size);
        if let Some(resize_tx) = self.ctx.resize_tx.lock().await.as_ref() {
            let _ = resize_tx.send((size.width, size.height)).await;
        }
        session.channel_success(channel);
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        let Some(chan) = self.channels.remove(&channel).flatten() else {
            session.channel_failure(channel);
            return Ok(());
        };
        self.channels.insert(channel, None);
        session.channel_success(channel);

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            crate::bridge::spawn_bridge(ctx, chan, None).await;
        });
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        let Some(chan) = self.channels.remove(&channel).flatten() else {
            session.channel_failure(channel);
            return Ok(());
        };
        self.channels.insert(channel, None);
        let command = String::from_utf8_lossy(data).to_string();
        *self.ctx.exec_command.lock().await = Some(command.clone());
        session.channel_success(channel);

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            crate::bridge::spawn_bridge(ctx, chan, Some(command)).await;
        });
        Ok(())
    }

    async fn subsystem_request(
        &mut self,
        channel: ChannelId,
        name: &str,
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        if name != "sftp" {
            session.channel_failure(channel);
            return Ok(());
        }
        let Some(chan) = self.channels.remove(&channel).flatten() else {
            session.channel_failure(channel);
            return Ok(());
        };
        self.channels.insert(channel, None);
        session.channel_success(channel);

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            let handler = crate::sftp::SftpHandler::new(ctx);
            russh_sftp::server::run(chan.into_stream(), handler).await;
        });
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        self.channels.remove(&channel);
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut server::Session,
    ) -> Result<(), Self::Error> {
        if self.channels.remove(&channel).is_some() {
            session.close(channel);
        }
        Ok(())
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            ctx.cleanup().await;
        });
    }
}
