use std::collections::BTreeMap;

use session::{ConnectionRole, OutputTarget, SessionId, SessionOutput};

use crate::channels::{OutputRx, RegisterRx, SessionWriteTx, UnregisterRx};

/// Writer handles partitioned by connection role.
#[derive(Debug, Default)]
pub struct ConnectionGroups {
    groups: BTreeMap<ConnectionRole, BTreeMap<SessionId, SessionWriteTx>>,
}

impl ConnectionGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session_id: SessionId, role: ConnectionRole, write_tx: SessionWriteTx) {
        self.groups.entry(role).or_default().insert(session_id, write_tx);
    }

    /// Drop a writer from whichever group holds it.
    pub fn remove(&mut self, session_id: SessionId) -> bool {
        self.groups
            .values_mut()
            .any(|group| group.remove(&session_id).is_some())
    }

    pub fn len(&self, role: ConnectionRole) -> usize {
        self.groups.get(&role).map_or(0, BTreeMap::len)
    }

    /// Deliver a frame, returning how many writers accepted it.
    ///
    /// Writers whose channel is closed are pruned. Sends never wait, so one
    /// slow connection cannot hold up the others.
    pub fn deliver(&mut self, output: SessionOutput) -> usize {
        match output.target {
            OutputTarget::Session(session_id) => {
                let Some((role, tx)) = self.find(session_id) else {
                    return 0;
                };
                if tx.send(output.text).is_err() {
                    tracing::debug!(?session_id, "Output router: session write channel closed");
                    if let Some(group) = self.groups.get_mut(&role) {
                        group.remove(&session_id);
                    }
                    return 0;
                }
                1
            }
            OutputTarget::Group(role) => {
                let Some(group) = self.groups.get_mut(&role) else {
                    return 0;
                };
                let mut closed = Vec::new();
                for (session_id, tx) in group.iter() {
                    if tx.send(output.text.clone()).is_err() {
                        closed.push(*session_id);
                    }
                }
                for session_id in &closed {
                    tracing::debug!(?session_id, "Output router: session write channel closed");
                    group.remove(session_id);
                }
                group.len()
            }
        }
    }

    fn find(&self, session_id: SessionId) -> Option<(ConnectionRole, &SessionWriteTx)> {
        self.groups
            .iter()
            .find_map(|(role, group)| group.get(&session_id).map(|tx| (*role, tx)))
    }
}

/// Routes outgoing frames to a single session or a whole role group.
pub async fn run_output_router(
    mut output_rx: OutputRx,
    mut register_rx: RegisterRx,
    mut unregister_rx: UnregisterRx,
) {
    let mut groups = ConnectionGroups::new();

    loop {
        // Registrations first: a connection registers before the relay hears
        // of it, so its direct catch-up frame must find it in the table.
        tokio::select! {
            biased;
            Some(reg) = register_rx.recv() => {
                tracing::debug!(session_id = ?reg.session_id, role = ?reg.role, "Output router: session registered");
                groups.insert(reg.session_id, reg.role, reg.write_tx);
            }
            Some(session_id) = unregister_rx.recv() => {
                tracing::debug!(session_id = ?session_id, "Output router: session unregistered");
                groups.remove(session_id);
            }
            Some(output) = output_rx.recv() => {
                groups.deliver(output);
            }
            else => break,
        }
    }

    tracing::info!("Output router shutting down");
}
