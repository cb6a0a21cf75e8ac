//! Server network layer handling UDP communications and game loop coordination
//!
//! All mutation funnels through one `tokio::select!` loop: packets arrive via
//! an mpsc channel from the receiver task and are handled in arrival order,
//! so hit claims are validated strictly in server-receipt (FIFO) order and
//! the lag compensation engine only ever has a single writer.

use crate::client_manager::ClientManager;
use crate::game::World;
use crate::validation::{LagCompensationConfig, LagCompensator};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{InputState, Packet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};
use tokio::time::interval;

/// Ticks between RTT heartbeat probes to all clients.
const HEARTBEAT_INTERVAL_TICKS: u32 = 30;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    ClientTimeout {
        client_id: u32,
    },
    #[allow(dead_code)]
    Shutdown,
}

/// Messages sent from game loop to network tasks
#[derive(Debug)]
pub enum GameMessage {
    SendPacket {
        packet: Packet,
        addr: SocketAddr,
    },
    BroadcastPacket {
        packet: Packet,
        exclude: Option<u32>,
    },
}

/// Main server coordinating networking, simulation and hit validation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    world: World,
    engine: LagCompensator,
    tick_duration: Duration,
    /// Origin of the monotonic server clock handed to the engine.
    started: Instant,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        config: LagCompensationConfig,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", addr);

        let engine = LagCompensator::new(config)?;

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            world: World::new(),
            engine,
            tick_duration,
            started: Instant::now(),
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    /// Seconds on the monotonic server clock.
    fn now(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Milliseconds on the monotonic server clock, for heartbeat stamps.
    fn now_millis(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    /// Spawns task that continuously listens for incoming packets
    async fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    async fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::BroadcastPacket { packet, exclude } => {
                        let client_addrs = {
                            let clients_guard = clients.read().await;
                            clients_guard.client_addrs()
                        };

                        for (client_id, addr) in client_addrs {
                            if Some(client_id) == exclude {
                                continue;
                            }

                            if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                                error!("Failed to send to client {}: {}", client_id, e);
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    async fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        break;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    async fn send_packet(&self, packet: &Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket {
            packet: packet.clone(),
            addr,
        }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn broadcast_packet(&self, packet: &Packet, exclude: Option<u32>) {
        if let Err(e) = self.game_tx.send(GameMessage::BroadcastPacket {
            packet: packet.clone(),
            exclude,
        }) {
            error!("Failed to queue broadcast packet: {}", e);
        }
    }

    /// Processes incoming packets in arrival order
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );

                // Remove existing connection if present
                let existing_client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(existing_id) = existing_client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    {
                        let mut clients = self.clients.write().await;
                        clients.remove_client(&existing_id);
                    }
                    self.drop_player(existing_id);
                }

                // Try to add new client
                let client_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                if let Some(client_id) = client_id {
                    self.world.add_player(client_id);
                    let response = Packet::Connected { client_id };
                    self.send_packet(&response, addr).await;
                } else {
                    let response = Packet::Disconnected {
                        reason: "Server full".to_string(),
                    };
                    self.send_packet(&response, addr).await;
                }
            }

            Packet::Input {
                sequence,
                timestamp,
                move_x,
                move_z,
            } => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let input = InputState {
                        sequence,
                        timestamp,
                        move_x,
                        move_z,
                    };

                    let mut clients = self.clients.write().await;
                    clients.add_input(client_id, input);
                }
            }

            Packet::Heartbeat { timestamp } => {
                // Client-initiated ping, echo it back so the client can
                // estimate its own latency
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let mut clients = self.clients.write().await;
                    clients.touch(client_id);
                }

                self.send_packet(&Packet::HeartbeatAck { timestamp }, addr)
                    .await;
            }

            Packet::HeartbeatAck { timestamp } => {
                // Echo of our own probe: the stamp is server time, so the
                // difference is a full round trip measured on our clock
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    let sample = self.now_millis().saturating_sub(timestamp) as f64 / 1000.0;
                    let now = self.now();
                    self.engine.update_rtt(client_id, sample, now);

                    let mut clients = self.clients.write().await;
                    clients.touch(client_id);
                }
            }

            Packet::HitClaim {
                target_id,
                damage,
                hit_position,
                client_timestamp,
                weapon_id,
            } => {
                let shooter_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(shooter_id) = shooter_id {
                    let now = self.now();
                    let claim = self.engine.create_hit_request(
                        shooter_id,
                        target_id,
                        damage,
                        hit_position,
                        weapon_id,
                        client_timestamp,
                        now,
                    );
                    let verdict = self.engine.validate_hit(&claim);

                    let response = Packet::HitResult {
                        target_id,
                        accepted: verdict.accepted,
                        resolved_position: verdict.resolved_position,
                    };
                    self.send_packet(&response, addr).await;
                } else {
                    warn!("Hit claim from unknown address {}", addr);
                }
            }

            Packet::Disconnect => {
                let client_id = {
                    let clients = self.clients.read().await;
                    clients.find_client_by_addr(addr)
                };

                if let Some(client_id) = client_id {
                    {
                        let mut clients = self.clients.write().await;
                        clients.remove_client(&client_id);
                    }
                    self.drop_player(client_id);
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Removes a player from the world and from engine bookkeeping.
    fn drop_player(&mut self, client_id: u32) {
        self.world.remove_player(&client_id);
        self.engine.remove_entity(client_id);
        self.engine.remove_participant(client_id);
    }

    /// Applies buffered inputs and advances the simulation one tick
    async fn advance_tick(&mut self, dt: f32) {
        let all_inputs = {
            let mut clients = self.clients.write().await;
            clients.drain_inputs()
        };

        for (client_id, input) in &all_inputs {
            self.world.apply_input(*client_id, input);
        }

        self.world.update(dt);
        self.world.tick += 1;

        // Record a fresh snapshot for every live entity this tick
        let now = self.now();
        for pose in self.world.poses() {
            self.engine
                .record_state(pose.id, pose.position, pose.rotation, pose.velocity, now);
        }
        self.engine.tick(now);
    }

    /// Broadcasts current world state to all connected clients
    async fn broadcast_game_state(&mut self) {
        let client_count = {
            let clients = self.clients.read().await;
            clients.len()
        };

        if client_count == 0 {
            return;
        }

        let packet = Packet::GameState {
            tick: self.world.tick,
            timestamp: self.now(),
            players: self.world.poses(),
        };

        self.broadcast_packet(&packet, None).await;
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        // Initialize concurrent tasks
        self.spawn_network_receiver().await;
        self.spawn_network_sender().await;
        self.spawn_timeout_checker().await;

        let mut tick_interval = interval(self.tick_duration);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            self.drop_player(client_id);
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.advance_tick(dt).await;
                    self.broadcast_game_state().await;

                    // Probe all clients for fresh RTT samples
                    if self.world.tick % HEARTBEAT_INTERVAL_TICKS == 0 {
                        let probe = Packet::Heartbeat { timestamp: self.now_millis() };
                        self.broadcast_packet(&probe, None).await;
                    }

                    // Periodic observability
                    if self.world.tick % 300 == 0 {
                        let stats = self.engine.stats();
                        if stats.total_players > 0 {
                            debug!(
                                "Tick {}: {} players, {} snapshots, avg RTT {:.0}ms, {}/{} hits ok/rejected last second",
                                self.world.tick,
                                stats.total_players,
                                stats.total_snapshots,
                                stats.average_rtt * 1000.0,
                                stats.validated_hits_last_second,
                                stats.rejected_hits_last_second,
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}
