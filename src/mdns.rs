//! mDNS service discovery module
//!
//! Advertises the HTTP control endpoint as "_heartbeat._tcp.local." so the
//! desktop BPM pusher can find the beacon without a hard-coded IP. The
//! edge-mdns host/service definitions are the source of truth; this module
//! encodes them into the announcement/response packet and the responder
//! task in `main` does the socket work.

use crate::{config, BoardError};
use core::net::{Ipv4Addr, Ipv6Addr};
use edge_mdns::{
    domain::base::Ttl,
    host::{Host, Service},
};
use esp_println::println;
use heapless::String;

/// Maximum mDNS packet size
pub const MAX_MDNS_PACKET_SIZE: usize = 512;

const TYPE_PTR: u16 = 12;
const TYPE_SRV: u16 = 33;
const TYPE_A: u16 = 1;

/// mDNS service manager
pub struct MdnsManager {
    hostname: String<32>,
    is_running: bool,
    ip_address: Option<[u8; 4]>,
}

impl MdnsManager {
    /// Create new mDNS manager
    pub fn new() -> Self {
        let mut hostname = String::new();
        hostname.push_str("pulse-rs").ok();

        Self {
            hostname,
            is_running: false,
            ip_address: None,
        }
    }

    /// Start advertising the control endpoint at the given address
    pub fn start_service(&mut self, ip_address: [u8; 4]) -> Result<(), BoardError> {
        self.ip_address = Some(ip_address);
        self.is_running = true;

        if self.create_service().is_none() {
            return Err(BoardError::MdnsError);
        }

        if self.create_host().is_none() {
            return Err(BoardError::MdnsError);
        }

        println!("[MDNS] Advertising {} on port {}", config::MDNS_SERVICE_NAME, config::HTTP_PORT);

        Ok(())
    }

    /// mDNS service definition for edge-mdns
    fn create_service(&self) -> Option<Service<'_>> {
        if !self.is_running {
            return None;
        }

        Some(Service {
            name: "pulse-rs",
            priority: 0,
            weight: 0,
            service: "_heartbeat",
            protocol: "_tcp",
            port: config::HTTP_PORT,
            service_subtypes: &[],
            txt_kvs: &[
                ("version", crate::VERSION),
                ("protocol", "bpm-over-http"),
                ("path", "/bpm"),
            ],
        })
    }

    /// Host definition for edge-mdns
    fn create_host(&self) -> Option<Host<'_>> {
        let ip = self.ip_address?;
        Some(Host {
            hostname: self.hostname.as_str(),
            ipv4: Ipv4Addr::from(ip),
            ipv6: Ipv6Addr::UNSPECIFIED,
            ttl: Ttl::from_secs(120),
        })
    }

    /// Encode the announcement/response packet for the advertised service
    ///
    /// Standard mDNS response with three answer records: PTR (service type
    /// to instance), SRV (instance to host and port) and A (host to
    /// address). Returns the packet length, or `None` before
    /// [`MdnsManager::start_service`] has been called.
    pub fn build_response(&self, buf: &mut [u8; MAX_MDNS_PACKET_SIZE]) -> Option<usize> {
        let service = self.create_service()?;
        let host = self.create_host()?;

        buf.fill(0);

        // DNS header: transaction ID 0, authoritative response flags,
        // no questions, 3 answer records
        buf[2] = 0x84;
        buf[7] = 0x03;

        let mut offset = 12;

        // PTR: "_heartbeat._tcp.local." -> "pulse-rs._heartbeat._tcp.local."
        offset = write_name(buf, offset, &[service.service, service.protocol, "local"]);
        offset = write_record_header(buf, offset, TYPE_PTR);
        let instance = [service.name, service.service, service.protocol, "local"];
        offset = write_rdata_len(buf, offset, name_len(&instance));
        let instance_offset = offset;
        offset = write_name(buf, offset, &instance);

        // SRV for the instance, name compressed back to the PTR data
        offset = write_name_pointer(buf, offset, instance_offset);
        offset = write_record_header(buf, offset, TYPE_SRV);
        let target = [host.hostname, "local"];
        offset = write_rdata_len(buf, offset, 6 + name_len(&target));
        offset += 4; // priority and weight stay 0
        buf[offset] = (service.port >> 8) as u8;
        buf[offset + 1] = (service.port & 0xFF) as u8;
        offset += 2;
        let hostname_offset = offset;
        offset = write_name(buf, offset, &target);

        // A record for the host
        offset = write_name_pointer(buf, offset, hostname_offset);
        offset = write_record_header(buf, offset, TYPE_A);
        offset = write_rdata_len(buf, offset, 4);
        buf[offset..offset + 4].copy_from_slice(&host.ipv4.octets());
        offset += 4;

        Some(offset)
    }
}

impl Default for MdnsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Total encoded length of a label sequence, including the terminator
fn name_len(labels: &[&str]) -> usize {
    labels.iter().map(|label| 1 + label.len()).sum::<usize>() + 1
}

/// Write a DNS name as length-prefixed labels, returning the new offset
fn write_name(buf: &mut [u8], mut offset: usize, labels: &[&str]) -> usize {
    for label in labels {
        buf[offset] = label.len() as u8;
        offset += 1;
        buf[offset..offset + label.len()].copy_from_slice(label.as_bytes());
        offset += label.len();
    }
    buf[offset] = 0;
    offset + 1
}

/// Write a compression pointer to a name earlier in the packet
fn write_name_pointer(buf: &mut [u8], offset: usize, target: usize) -> usize {
    buf[offset] = 0xC0 | (target >> 8) as u8;
    buf[offset + 1] = target as u8;
    offset + 2
}

/// Write record type, cache-flush IN class and a 120s TTL
fn write_record_header(buf: &mut [u8], offset: usize, record_type: u16) -> usize {
    buf[offset] = (record_type >> 8) as u8;
    buf[offset + 1] = record_type as u8;
    buf[offset + 2] = 0x80; // cache flush bit
    buf[offset + 3] = 0x01; // class IN
    buf[offset + 7] = 0x78; // TTL 120 seconds
    offset + 8
}

/// Write the rdata length field
fn write_rdata_len(buf: &mut [u8], offset: usize, len: usize) -> usize {
    buf[offset] = (len >> 8) as u8;
    buf[offset + 1] = len as u8;
    offset + 2
}
