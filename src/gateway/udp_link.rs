use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::{
    audio::{Frame, FrameFormat, constants::BYTES_PER_SAMPLE},
    common::{ChannelId, GuildId, TransportError},
    configs::TransportConfig,
    gateway::{
        BoxedConnection, StateSink, VoiceConnection, VoiceTransport,
        constants::{RTP_HEADER_LEN, RTP_VERSION_BYTE},
    },
};

/// Builds RTP packets carrying raw L16 stereo audio.
pub struct RtpPacketizer {
    payload_type: u8,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    timestamp_step: u32,
    /// Reusable packet buffer, cleared per frame.
    packet_buf: Vec<u8>,
}

impl RtpPacketizer {
    pub fn new(payload_type: u8, ssrc: u32, format: FrameFormat) -> Self {
        Self {
            payload_type: payload_type & 0x7f,
            ssrc,
            sequence: 0,
            timestamp: 0,
            timestamp_step: format.samples_per_channel() as u32,
            packet_buf: Vec::with_capacity(RTP_HEADER_LEN + format.byte_len()),
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    /// Returns the next packet for `pcm` (s16le). Sequence and timestamp
    /// advance on every call and wrap around.
    pub fn packetize(&mut self, pcm: &[u8]) -> &[u8] {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        let timestamp = self.timestamp;
        self.timestamp = self.timestamp.wrapping_add(self.timestamp_step);

        let mut header = [0u8; RTP_HEADER_LEN];
        header[0] = RTP_VERSION_BYTE;
        header[1] = self.payload_type;
        header[2..4].copy_from_slice(&sequence.to_be_bytes());
        header[4..8].copy_from_slice(&timestamp.to_be_bytes());
        header[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        self.packet_buf.clear();
        self.packet_buf.extend_from_slice(&header);

        // L16 is big-endian on the wire.
        for sample in pcm.chunks_exact(BYTES_PER_SAMPLE) {
            self.packet_buf.push(sample[1]);
            self.packet_buf.push(sample[0]);
        }

        &self.packet_buf
    }
}

/// Sends frames as RTP over UDP to a fixed voice relay endpoint.
pub struct UdpTransport {
    endpoint: String,
    payload_type: u8,
    format: FrameFormat,
}

impl UdpTransport {
    pub fn new(config: &TransportConfig, format: FrameFormat) -> Self {
        Self {
            endpoint: config.endpoint.clone(),
            payload_type: config.payload_type,
            format,
        }
    }
}

#[async_trait]
impl VoiceTransport for UdpTransport {
    async fn connect(
        &self,
        guild_id: &GuildId,
        channel_id: ChannelId,
        _sink: StateSink,
    ) -> Result<BoxedConnection, TransportError> {
        let address = tokio::net::lookup_host(&self.endpoint)
            .await
            .map_err(|e| TransportError::Connect(format!("resolving {}: {e}", self.endpoint)))?
            .next()
            .ok_or_else(|| {
                TransportError::Connect(format!("{} resolved to no address", self.endpoint))
            })?;

        let bind: SocketAddr = if address.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| TransportError::Connect(format!("binding udp socket: {e}")))?;
        socket
            .connect(address)
            .await
            .map_err(|e| TransportError::Connect(format!("connecting to {address}: {e}")))?;

        let packetizer = RtpPacketizer::new(self.payload_type, rand::random(), self.format);
        info!(
            "[{}] voice link to {} for channel {} (ssrc {})",
            guild_id,
            address,
            channel_id,
            packetizer.ssrc()
        );

        Ok(Box::new(UdpConnection {
            guild_id: guild_id.clone(),
            channel_id,
            socket: Some(socket),
            packetizer,
        }))
    }
}

pub struct UdpConnection {
    guild_id: GuildId,
    channel_id: ChannelId,
    socket: Option<UdpSocket>,
    packetizer: RtpPacketizer,
}

#[async_trait]
impl VoiceConnection for UdpConnection {
    async fn send_frame(&mut self, frame: &Frame) -> Result<(), TransportError> {
        let socket = self.socket.as_ref().ok_or(TransportError::Closed)?;
        let packet = self.packetizer.packetize(frame.as_bytes());
        socket
            .send(packet)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn disconnect(&mut self) {
        if self.socket.take().is_some() {
            debug!(
                "[{}] voice link for channel {} closed",
                self.guild_id, self.channel_id
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(packet: &[u8]) -> (u8, u8, u16, u32, u32) {
        (
            packet[0],
            packet[1],
            u16::from_be_bytes([packet[2], packet[3]]),
            u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
            u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
        )
    }

    #[test]
    fn header_advances_per_frame() {
        let mut rtp = RtpPacketizer::new(96, 0xdead_beef, FrameFormat::new(20));
        let pcm = [0u8; 3840];

        assert_eq!(header(rtp.packetize(&pcm)), (0x80, 96, 0, 0, 0xdead_beef));
        assert_eq!(header(rtp.packetize(&pcm)), (0x80, 96, 1, 960, 0xdead_beef));
        assert_eq!(rtp.packetize(&pcm).len(), RTP_HEADER_LEN + 3840);
    }

    #[test]
    fn sequence_and_timestamp_wrap() {
        let mut rtp = RtpPacketizer::new(96, 1, FrameFormat::new(20));
        rtp.sequence = u16::MAX;
        rtp.timestamp = u32::MAX - 100;

        rtp.packetize(&[0u8; 4]);
        let (_, _, seq, ts, _) = header(rtp.packetize(&[0u8; 4]));
        assert_eq!(seq, 0);
        assert_eq!(ts, 859);
    }

    #[test]
    fn payload_is_big_endian() {
        let mut rtp = RtpPacketizer::new(96, 1, FrameFormat::new(10));
        let pcm: Vec<u8> = [0x0102i16, -2].iter().flat_map(|s| s.to_le_bytes()).collect();
        let packet = rtp.packetize(&pcm);
        assert_eq!(&packet[RTP_HEADER_LEN..], &[0x01, 0x02, 0xff, 0xfe]);
    }

    #[tokio::test]
    async fn delivers_packets_over_loopback() {
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let endpoint = relay.local_addr().unwrap().to_string();
        let config = TransportConfig {
            endpoint,
            payload_type: 100,
        };
        let transport = UdpTransport::new(&config, FrameFormat::new(10));
        let (tx, _rx) = flume::unbounded::<crate::player::SessionMsg>();

        let mut conn = transport
            .connect(
                &GuildId::from("g1"),
                ChannelId(7),
                StateSink::new(crate::gateway::ConnectionId(1), tx.downgrade()),
            )
            .await
            .unwrap();

        let frame = Frame::from(vec![0u8; FrameFormat::new(10).byte_len()]);
        conn.send_frame(&frame).await.unwrap();

        let mut buf = vec![0u8; 4096];
        let n = relay.recv(&mut buf).await.unwrap();
        assert_eq!(n, RTP_HEADER_LEN + 1920);
        assert_eq!(buf[1], 100);

        conn.disconnect().await;
        assert!(matches!(
            conn.send_frame(&frame).await,
            Err(TransportError::Closed)
        ));
    }
}
