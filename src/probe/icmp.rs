//! ICMP echo prober.
//!
//! Uses unprivileged datagram ICMP sockets (`net.ipv4.ping_group_range` on
//! Linux), so the monitor does not need raw-socket capabilities. Where the
//! socket cannot be opened every address reads as dead.

use socket2::{Domain, Protocol, Socket, Type};
use std::future::Future;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time;

use crate::config::ProbeConfig;
use crate::probe::prober::{ProbeOutcome, ProbePolicy, Prober};

const ECHO_REQUEST: u8 = 8;
const ECHO_REPLY: u8 = 0;
const PAYLOAD: &[u8; 32] = b"topology-monitor liveness probe.";

#[derive(Debug, Clone)]
pub struct IcmpProber {
    normal: ProbePolicy,
    priority: ProbePolicy,
}

impl IcmpProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            normal: ProbePolicy::normal(config),
            priority: ProbePolicy::priority(config),
        }
    }

    pub fn policy(&self, priority: bool) -> ProbePolicy {
        if priority {
            self.priority
        } else {
            self.normal
        }
    }
}

impl Prober for IcmpProber {
    fn check(&self, ip: Ipv4Addr, priority: bool) -> impl Future<Output = ProbeOutcome> + Send {
        let policy = self.policy(priority);
        async move {
            match ping(ip, policy).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::debug!(ip = %ip, error = %e, "Probe failed");
                    ProbeOutcome::dead()
                }
            }
        }
    }
}

/// Send `policy.attempts` echo requests; alive if any is answered in time.
async fn ping(ip: Ipv4Addr, policy: ProbePolicy) -> io::Result<ProbeOutcome> {
    let socket = open_socket()?;
    let target = SocketAddr::new(IpAddr::V4(ip), 0);
    let ident: u16 = rand::random();
    let mut round_trips: Vec<Duration> = Vec::with_capacity(policy.attempts as usize);

    for attempt in 0..policy.attempts {
        let seq = attempt as u16;
        let packet = echo_request(ident, seq);
        let sent = Instant::now();
        socket.send_to(&packet, target).await?;

        match time::timeout(policy.timeout, await_reply(&socket, ip, seq)).await {
            Ok(Ok(())) => round_trips.push(sent.elapsed()),
            Ok(Err(e)) => tracing::trace!(ip = %ip, seq, error = %e, "Echo receive failed"),
            Err(_) => tracing::trace!(ip = %ip, seq, "Echo timed out"),
        }
    }

    if round_trips.is_empty() {
        tracing::debug!(ip = %ip, attempts = policy.attempts, "Address offline");
        return Ok(ProbeOutcome::dead());
    }
    let total: Duration = round_trips.iter().sum();
    let mean = total / round_trips.len() as u32;
    Ok(ProbeOutcome::alive(mean.as_millis() as u64))
}

fn open_socket() -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

async fn await_reply(socket: &UdpSocket, ip: Ipv4Addr, seq: u16) -> io::Result<()> {
    let mut buf = [0u8; 1500];
    loop {
        let (len, from) = socket.recv_from(&mut buf).await?;
        if from.ip() != IpAddr::V4(ip) {
            continue;
        }
        if is_reply_to(&buf[..len], seq) {
            return Ok(());
        }
    }
}

/// Build an echo request. The kernel may rewrite `ident` on datagram sockets.
fn echo_request(ident: u16, seq: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(8 + PAYLOAD.len());
    packet.extend_from_slice(&[ECHO_REQUEST, 0, 0, 0]);
    packet.extend_from_slice(&ident.to_be_bytes());
    packet.extend_from_slice(&seq.to_be_bytes());
    packet.extend_from_slice(PAYLOAD);
    let sum = checksum(&packet);
    packet[2..4].copy_from_slice(&sum.to_be_bytes());
    packet
}

/// Match an echo reply by sequence number, with or without a leading IPv4 header.
fn is_reply_to(mut packet: &[u8], seq: u16) -> bool {
    if packet.first().map(|b| b >> 4) == Some(4) {
        let header_len = usize::from(packet[0] & 0x0f) * 4;
        if packet.len() < header_len {
            return false;
        }
        packet = &packet[header_len..];
    }
    packet.len() >= 8 && packet[0] == ECHO_REPLY && u16::from_be_bytes([packet[6], packet[7]]) == seq
}

/// RFC 1071 ones'-complement checksum.
fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}
