use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use futures::{AsyncRead, AsyncWrite, StreamExt};
use libp2p::{
    gossipsub, identify, kad, noise, ping, request_response, swarm::NetworkBehaviour,
    swarm::SwarmEvent, tcp, yamux, Multiaddr, PeerId, StreamProtocol, Swarm,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use helix_core::constants::MAX_SINGLE_FRAME_BYTES;

use crate::config::P2pConfig;
use crate::error::P2pError;
use crate::message::WireMessage;

const WIRE_PROTOCOL: &str = "/helix/wire/1";

/// Codec for the point-to-point request/response packets of §6 (the
/// `Get*`/response pairs). Broadcast packets (`NewDagBlock`, `Transaction`,
/// `PbftVote`, ...) still go over gossipsub, mirroring the topic-based
/// publish/subscribe pattern the rest of the wire relies on; this codec
/// covers only the packets that need a direct reply to one peer.
#[derive(Clone, Default)]
pub struct WireCodec;

#[async_trait]
impl request_response::Codec for WireCodec {
    type Protocol = StreamProtocol;
    type Request = WireMessage;
    type Response = WireMessage;

    async fn read_request<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Self::Request>
    where
        T: AsyncRead + Unpin + Send,
    {
        let bytes = request_response::read_length_prefixed(io, MAX_SINGLE_FRAME_BYTES).await?;
        WireMessage::from_bytes(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }

    async fn read_response<T>(&mut self, _: &Self::Protocol, io: &mut T) -> io::Result<Self::Response>
    where
        T: AsyncRead + Unpin + Send,
    {
        let bytes = request_response::read_length_prefixed(io, MAX_SINGLE_FRAME_BYTES).await?;
        WireMessage::from_bytes(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
    }

    async fn write_request<T>(&mut self, _: &Self::Protocol, io: &mut T, req: Self::Request) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        request_response::write_length_prefixed(io, req.to_bytes()).await
    }

    async fn write_response<T>(&mut self, _: &Self::Protocol, io: &mut T, res: Self::Response) -> io::Result<()>
    where
        T: AsyncWrite + Unpin + Send,
    {
        request_response::write_length_prefixed(io, res.to_bytes()).await
    }
}

/// Combined libp2p network behaviour.
///
/// The `#[derive(NetworkBehaviour)]` macro auto-generates a
/// `HelixBehaviourEvent` enum with one variant per field.
#[derive(NetworkBehaviour)]
pub struct HelixBehaviour {
    pub gossipsub: gossipsub::Behaviour,
    pub kademlia: kad::Behaviour<kad::store::MemoryStore>,
    pub identify: identify::Behaviour,
    pub ping: ping::Behaviour,
    pub request_response: request_response::Behaviour<WireCodec>,
}

/// Something worth handing up from the swarm event loop to the rest of the
/// node.
#[derive(Debug)]
pub enum InboundEvent {
    Gossip { from: PeerId, message: WireMessage },
    Request {
        from: PeerId,
        message: WireMessage,
        channel: request_response::ResponseChannel<WireMessage>,
    },
    PeerConnected(PeerId),
    PeerDisconnected(PeerId),
}

/// Something the rest of the node asks the swarm to do.
pub enum OutboundCommand {
    /// Publish on the shared gossip topic.
    Broadcast(WireMessage),
    /// Send a request to one peer and await its reply out-of-band.
    Request {
        peer: PeerId,
        message: WireMessage,
        reply: oneshot::Sender<Result<WireMessage, P2pError>>,
    },
    /// Answer a previously received request.
    Respond {
        channel: request_response::ResponseChannel<WireMessage>,
        message: WireMessage,
    },
}

/// Application-facing handle returned from `P2pNetwork::new()`.
pub struct P2pHandle {
    pub outbound_tx: mpsc::Sender<OutboundCommand>,
    pub inbound_rx: mpsc::Receiver<InboundEvent>,
    pub local_peer_id: PeerId,
}

/// Owns the libp2p Swarm. Pass to `tokio::spawn(network.run())`.
pub struct P2pNetwork {
    swarm: Swarm<HelixBehaviour>,
    topic: gossipsub::IdentTopic,
    outbound_rx: mpsc::Receiver<OutboundCommand>,
    inbound_tx: mpsc::Sender<InboundEvent>,
    pending: std::collections::HashMap<request_response::OutboundRequestId, oneshot::Sender<Result<WireMessage, P2pError>>>,
}

impl P2pNetwork {
    /// Build the network and return `(P2pNetwork, P2pHandle)`.
    pub fn new(
        config: &P2pConfig,
    ) -> Result<(Self, P2pHandle), Box<dyn std::error::Error + Send + Sync>> {
        let topic = gossipsub::IdentTopic::new(&config.gossip_topic);

        let mut swarm = libp2p::SwarmBuilder::with_new_identity()
            .with_tokio()
            .with_tcp(
                tcp::Config::default(),
                noise::Config::new,
                yamux::Config::default,
            )?
            .with_behaviour(|key: &libp2p::identity::Keypair| {
                let message_id_fn = |msg: &gossipsub::Message| {
                    let mut s = DefaultHasher::new();
                    msg.data.hash(&mut s);
                    gossipsub::MessageId::from(s.finish().to_string())
                };

                let gossipsub_config = gossipsub::ConfigBuilder::default()
                    .heartbeat_interval(Duration::from_secs(1))
                    .validation_mode(gossipsub::ValidationMode::Strict)
                    .message_id_fn(message_id_fn)
                    .build()
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let gossipsub = gossipsub::Behaviour::new(
                    gossipsub::MessageAuthenticity::Signed(key.clone()),
                    gossipsub_config,
                )
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

                let store = kad::store::MemoryStore::new(key.public().to_peer_id());
                let kademlia = kad::Behaviour::new(key.public().to_peer_id(), store);

                let identify = identify::Behaviour::new(identify::Config::new(
                    config.protocol_version.clone(),
                    key.public(),
                ));

                let ping = ping::Behaviour::default();

                let request_response = request_response::Behaviour::with_codec(
                    WireCodec,
                    std::iter::once((StreamProtocol::new(WIRE_PROTOCOL), request_response::ProtocolSupport::Full)),
                    request_response::Config::default(),
                );

                Ok(HelixBehaviour { gossipsub, kademlia, identify, ping, request_response })
            })?
            .build();

        swarm.behaviour_mut().gossipsub.subscribe(&topic)?;

        let listen_addr: Multiaddr = config.listen_addr.parse()?;
        swarm.listen_on(listen_addr)?;

        for addr_str in &config.bootstrap_peers {
            if let Ok(addr) = addr_str.parse::<Multiaddr>() {
                if let Some(libp2p::multiaddr::Protocol::P2p(peer_id)) = addr.iter().last() {
                    swarm.behaviour_mut().kademlia.add_address(&peer_id, addr.clone());
                    debug!(peer = %peer_id, "added bootstrap peer");
                }
            }
        }

        let local_peer_id = *swarm.local_peer_id();
        let (outbound_tx, outbound_rx) = mpsc::channel(256);
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let network = P2pNetwork {
            swarm,
            topic,
            outbound_rx,
            inbound_tx,
            pending: std::collections::HashMap::new(),
        };
        let handle = P2pHandle { outbound_tx, inbound_rx, local_peer_id };

        Ok((network, handle))
    }

    /// Drive the P2P event loop. Run in a dedicated tokio task.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some(cmd) = self.outbound_rx.recv() => self.handle_outbound(cmd),

                event = self.swarm.select_next_some() => self.handle_swarm_event(event).await,
            }
        }
    }

    fn handle_outbound(&mut self, cmd: OutboundCommand) {
        match cmd {
            OutboundCommand::Broadcast(msg) => {
                if let Err(e) = self
                    .swarm
                    .behaviour_mut()
                    .gossipsub
                    .publish(self.topic.clone(), msg.to_bytes())
                {
                    warn!(error = %e, "gossipsub publish failed");
                }
            }
            OutboundCommand::Request { peer, message, reply } => {
                let id = self
                    .swarm
                    .behaviour_mut()
                    .request_response
                    .send_request(&peer, message);
                self.pending.insert(id, reply);
            }
            OutboundCommand::Respond { channel, message } => {
                if self
                    .swarm
                    .behaviour_mut()
                    .request_response
                    .send_response(channel, message)
                    .is_err()
                {
                    debug!("response channel closed before reply was sent");
                }
            }
        }
    }

    async fn handle_swarm_event(&mut self, event: SwarmEvent<HelixBehaviourEvent>) {
        match event {
            SwarmEvent::NewListenAddr { address, .. } => {
                info!(addr = %address, "P2P listening on");
            }
            SwarmEvent::Behaviour(HelixBehaviourEvent::Gossipsub(gossipsub::Event::Message {
                message, propagation_source, ..
            })) => match WireMessage::from_bytes(&message.data) {
                Ok(msg) => {
                    let _ = self
                        .inbound_tx
                        .send(InboundEvent::Gossip { from: propagation_source, message: msg })
                        .await;
                }
                Err(e) => debug!(error = %e, "failed to decode gossip message"),
            },
            SwarmEvent::Behaviour(HelixBehaviourEvent::RequestResponse(event)) => {
                self.handle_request_response_event(event).await;
            }
            SwarmEvent::Behaviour(HelixBehaviourEvent::Identify(identify::Event::Received {
                peer_id,
                info,
                ..
            })) => {
                for addr in info.listen_addrs {
                    self.swarm.behaviour_mut().kademlia.add_address(&peer_id, addr);
                }
            }
            SwarmEvent::ConnectionEstablished { peer_id, .. } => {
                debug!(peer = %peer_id, "connection established");
                let _ = self.inbound_tx.send(InboundEvent::PeerConnected(peer_id)).await;
            }
            SwarmEvent::ConnectionClosed { peer_id, .. } => {
                debug!(peer = %peer_id, "connection closed");
                let _ = self.inbound_tx.send(InboundEvent::PeerDisconnected(peer_id)).await;
            }
            _ => {}
        }
    }

    async fn handle_request_response_event(
        &mut self,
        event: request_response::Event<WireMessage, WireMessage>,
    ) {
        match event {
            request_response::Event::Message { peer, message, .. } => match message {
                request_response::Message::Request { request, channel, .. } => {
                    let _ = self
                        .inbound_tx
                        .send(InboundEvent::Request { from: peer, message: request, channel })
                        .await;
                }
                request_response::Message::Response { request_id, response } => {
                    if let Some(reply) = self.pending.remove(&request_id) {
                        let _ = reply.send(Ok(response));
                    }
                }
            },
            request_response::Event::OutboundFailure { request_id, error, .. } => {
                if let Some(reply) = self.pending.remove(&request_id) {
                    let _ = reply.send(Err(P2pError::Transport(error.to_string())));
                }
            }
            request_response::Event::InboundFailure { error, .. } => {
                debug!(error = %error, "inbound request failed");
            }
            request_response::Event::ResponseSent { .. } => {}
        }
    }
}
