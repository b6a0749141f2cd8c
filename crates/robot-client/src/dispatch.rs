//! One handler per action kind.
//!
//! Handlers resolve remote handles from the mirror, issue their remote calls
//! strictly in order and report the outcome as the matching response. Calls
//! from different handlers are not serialized against each other.

use robot_client_core::{Action, Axis, Mount, Response, ResponseError, Slot};
use robot_client_transport::{RemoteCall, RemoteHandle};
use tokio::task::JoinHandle;

use crate::client::{ClientError, Link, SessionClient};

/// Builds the response for a handler from its outcome.
type Reply = fn(Option<ResponseError>) -> Response;

impl SessionClient {
    /// Handle `action` on a background task.
    pub fn dispatch(&self, action: Action) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move { client.handle(action).await })
    }

    /// Handle `action` to completion, including every response it emits.
    pub async fn handle(&self, action: Action) {
        tracing::debug!(client = %self.id(), action = action.kind(), "handling action");

        match action {
            Action::Connect { name } => self.connect(&name).await,
            Action::Disconnect => self.disconnect().await,
            Action::UploadProtocol { contents } => self.upload_protocol(contents).await,
            Action::PickupAndHome { mount, slot } => self.pickup_and_home(mount, &slot).await,
            Action::DropTipAndHome { mount, slot } => self.drop_tip_and_home(mount, &slot).await,
            Action::ConfirmProbed { mount } => self.home_pipette(mount).await,
            Action::ConfirmTiprack { mount, slot } => self.confirm_tiprack(mount, &slot).await,
            Action::MoveToFront { mount } => self.move_to_front(mount).await,
            Action::ProbeTip { mount } => self.probe_tip(mount).await,
            Action::MoveTo { mount, slot } => self.move_to(mount, &slot).await,
            Action::Jog {
                mount,
                axis,
                direction,
                step,
            } => self.jog(mount, axis, step * direction).await,
            Action::UpdateOffset { mount, slot } => self.update_offset(mount, &slot).await,
            Action::ReturnTip { mount } => self.return_tip(mount).await,
            Action::Run => self.run().await,
            Action::Pause => {
                self.session_call(RemoteCall::Pause, |error| Response::Pause { error })
                    .await;
            }
            Action::Resume => {
                self.session_call(RemoteCall::Resume, |error| Response::Resume { error })
                    .await;
            }
            Action::Cancel => self.cancel().await,
            Action::RefreshSession => self.refresh_session().await,
            Action::ServerSuccess { path, robot } => self.server_success(&path, &robot).await,
        }
    }

    /// Capture the live connection, or report `NotConnected` through `reply`.
    async fn link_or(&self, reply: Reply) -> Option<Link> {
        match self.link().await {
            Ok(link) => Some(link),
            Err(e) => {
                tracing::debug!("action without connection: {e}");
                self.emit(reply(Some(e.into())));
                None
            }
        }
    }

    /// Emit the outcome unless the connection it was issued on is gone.
    ///
    /// Returns whether the response was delivered.
    async fn settle<T>(&self, link: &Link, result: Result<T, ClientError>, reply: Reply) -> bool {
        let state = self.lock().await;
        if !state.is_live(link.generation) {
            tracing::debug!(generation = link.generation, "dropping stale response");
            return false;
        }
        if let Err(e) = &result {
            tracing::warn!(client = %self.id(), "remote call failed: {e}");
        }
        self.emit(reply(result.err().map(Into::into)));
        true
    }

    // the remote call only creates the session; success arrives as the
    // next session notification
    async fn upload_protocol(&self, contents: String) {
        let reply: Reply = |error| Response::Session {
            error,
            update: None,
            fresh_upload: false,
        };
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let Some(file) = self.query().protocol_file() else {
            self.settle(&link, Err::<(), _>(ClientError::NoProtocolFile), reply)
                .await;
            return;
        };

        {
            let mut state = self.lock().await;
            if !state.is_live(link.generation) {
                tracing::debug!(generation = link.generation, "connection gone before upload");
                return;
            }
            state.fresh_upload = true;
        }
        tracing::info!(client = %self.id(), protocol = %file.name, "uploading protocol");

        let result = link
            .call(RemoteCall::CreateSession {
                name: file.name,
                contents,
                is_binary: file.is_binary,
            })
            .await;

        if let Err(e) = result {
            let mut state = self.lock().await;
            if !state.is_live(link.generation) {
                return;
            }
            let fresh_upload = std::mem::take(&mut state.fresh_upload);
            tracing::warn!(client = %self.id(), "protocol upload failed: {e}");
            self.emit(Response::Session {
                error: Some(e.into()),
                update: None,
                fresh_upload,
            });
        }
    }

    // saves the labware offset, then attempts a tip pickup
    async fn pickup_and_home(&self, mount: Mount, slot: &Slot) {
        let reply: Reply = |error| Response::PickupAndHome { error };
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let result = async {
            let pipette = self.pipette(mount).await?;
            let labware = self.labware(slot).await?;
            link.call(RemoteCall::UpdateContainerOffset { labware, pipette })
                .await?;
            link.call(RemoteCall::PickUpTip { pipette, labware }).await
        }
        .await;
        self.settle(&link, result, reply).await;
    }

    async fn drop_tip_and_home(&self, mount: Mount, slot: &Slot) {
        let reply: Reply = |error| Response::DropTipAndHome { error };
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let result = async {
            let pipette = self.pipette(mount).await?;
            let labware = self.labware(slot).await?;
            link.call(RemoteCall::DropTip { pipette, labware }).await?;
            link.call(RemoteCall::Home { pipette }).await?;
            link.call(RemoteCall::MoveTo { pipette, labware }).await
        }
        .await;
        self.settle(&link, result, reply).await;
    }

    // completion shows up as a session notification, so no response here
    async fn home_pipette(&self, mount: Mount) {
        let result = async {
            let link = self.link().await?;
            let pipette = self.pipette(mount).await?;
            link.call(RemoteCall::Home { pipette }).await
        }
        .await;
        if let Err(e) = result {
            tracing::warn!(client = %self.id(), %mount, "home pipette failed: {e}");
        }
    }

    // drop the tip unless this is the last tip rack to confirm
    async fn confirm_tiprack(&self, mount: Mount, slot: &Slot) {
        if self.query().unconfirmed_tipracks() == 1 {
            self.emit(Response::ConfirmTiprack {
                error: None,
                tip_on: true,
            });
            return;
        }

        let reply: Reply = |error| Response::ConfirmTiprack {
            error,
            tip_on: false,
        };
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let result = async {
            let pipette = self.pipette(mount).await?;
            let labware = self.labware(slot).await?;
            link.call(RemoteCall::DropTip { pipette, labware }).await
        }
        .await;
        self.settle(&link, result, reply).await;
    }

    async fn move_to_front(&self, mount: Mount) {
        let reply: Reply = |error| Response::MoveToFront { error };
        self.pipette_call(mount, reply, |pipette| RemoteCall::MoveToFront { pipette })
            .await;
    }

    async fn probe_tip(&self, mount: Mount) {
        let reply: Reply = |error| Response::ProbeTip { error };
        self.pipette_call(mount, reply, |pipette| RemoteCall::TipProbe { pipette })
            .await;
    }

    async fn return_tip(&self, mount: Mount) {
        let reply: Reply = |error| Response::ReturnTip { error };
        self.pipette_call(mount, reply, |pipette| RemoteCall::ReturnTip { pipette })
            .await;
    }

    async fn jog(&self, mount: Mount, axis: Axis, distance: f64) {
        let reply: Reply = |error| Response::Jog { error };
        self.pipette_call(mount, reply, |pipette| RemoteCall::Jog {
            pipette,
            distance,
            axis,
        })
        .await;
    }

    async fn move_to(&self, mount: Mount, slot: &Slot) {
        let reply: Reply = |error| Response::MoveTo { error };
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let result = async {
            let pipette = self.pipette(mount).await?;
            let labware = self.labware(slot).await?;
            link.call(RemoteCall::MoveTo { pipette, labware }).await
        }
        .await;

        let succeeded = result.is_ok();
        if self.settle(&link, result, reply).await && succeeded {
            self.emit(Response::Navigate {
                path: self.config().labware_confirm_path(slot),
            });
        }
    }

    // saves the labware offset for non-tiprack labware
    async fn update_offset(&self, mount: Mount, slot: &Slot) {
        let reply: Reply = |error| Response::UpdateOffset { error };
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let result = async {
            let pipette = self.pipette(mount).await?;
            let labware = self.labware(slot).await?;
            link.call(RemoteCall::UpdateContainerOffset { labware, pipette })
                .await
        }
        .await;
        self.settle(&link, result, reply).await;
    }

    async fn run(&self) {
        let reply: Reply = |error| Response::Run { error };
        let Some(link) = self.link_or(reply).await else {
            return;
        };

        {
            let mut state = self.lock().await;
            if !state.is_live(link.generation) {
                tracing::debug!(generation = link.generation, "connection gone before run");
                return;
            }
            state.timer.start();
        }
        let result = link.call(RemoteCall::Run).await;
        self.settle(&link, result, reply).await;

        let mut state = self.lock().await;
        if state.is_live(link.generation) {
            state.timer.stop();
        }
    }

    // the robot cannot stop a paused protocol, so resume first
    async fn cancel(&self) {
        let reply: Reply = |error| Response::Cancel { error };
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let result = async {
            link.call(RemoteCall::Resume).await?;
            link.call(RemoteCall::Stop).await
        }
        .await;
        self.settle(&link, result, reply).await;
    }

    // a refreshed session arrives as a notification; only failures respond
    async fn refresh_session(&self) {
        let reply: Reply = |error| Response::Session {
            error,
            update: None,
            fresh_upload: false,
        };
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        if let Err(e) = link.call(RemoteCall::Refresh).await {
            self.settle(&link, Err::<(), _>(e), reply).await;
        }
    }

    // drop the connection before the robot restarts underneath it
    async fn server_success(&self, path: &str, robot: &str) {
        if path != "restart" {
            return;
        }
        if self.connected_robot().await.as_deref() == Some(robot) {
            tracing::info!(client = %self.id(), robot, "robot restarting, disconnecting");
            self.disconnect().await;
        }
    }

    async fn session_call(&self, call: RemoteCall, reply: Reply) {
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let result = link.call(call).await;
        self.settle(&link, result, reply).await;
    }

    async fn pipette_call<F>(&self, mount: Mount, reply: Reply, call: F)
    where
        F: FnOnce(RemoteHandle) -> RemoteCall + Send,
    {
        let Some(link) = self.link_or(reply).await else {
            return;
        };
        let result = async {
            let pipette = self.pipette(mount).await?;
            link.call(call(pipette)).await
        }
        .await;
        self.settle(&link, result, reply).await;
    }
}
