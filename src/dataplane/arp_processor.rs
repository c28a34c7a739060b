//! ARP packet processor
//!
//! Handles ARP arriving on an attachment point: replies feed the cache,
//! requests for our own address are answered unless the kernel owns ARP
//! on that side.

use super::attachment::AttachmentPoint;
use crate::protocol::arp::{ArpOp, ArpPacket};
use crate::protocol::VlanTag;
use tracing::{debug, warn};

/// Result of processing an ARP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArpAction {
    /// Reply consumed after learning the sender
    Learned,
    /// Hand the frame to the kernel fallback interface
    ToKernel,
    /// Send this reply frame back out of the same attachment point
    Reply(Vec<u8>),
    /// Not for us
    Ignored,
}

/// Process an incoming ARP packet
///
/// # Arguments
/// * `packet` - The parsed ARP packet
/// * `vlan` - 802.1Q tag of the frame that carried it
/// * `point` - Attachment point the frame arrived on
pub fn process_arp(
    packet: &ArpPacket,
    vlan: Option<VlanTag>,
    point: &AttachmentPoint,
) -> ArpAction {
    match packet.operation {
        ArpOp::Reply => {
            if point.arp.learn(packet.sender_ip, packet.sender_mac) {
                debug!(
                    interface = %point.name,
                    ip = %packet.sender_ip,
                    mac = %packet.sender_mac,
                    "learned ARP entry"
                );
            }
            if point.has_kernel_fallback() {
                ArpAction::ToKernel
            } else {
                ArpAction::Learned
            }
        }
        ArpOp::Request => {
            if point.has_kernel_fallback() {
                return ArpAction::ToKernel;
            }
            if packet.target_ip == point.address && packet.target_mac.is_zero() {
                let reply =
                    ArpPacket::reply(point.mac, point.address, packet.sender_mac, packet.sender_ip);
                return ArpAction::Reply(reply.to_frame(packet.sender_mac, point.mac, vlan));
            }
            warn!(
                interface = %point.name,
                sender = %packet.sender_ip,
                target = %packet.target_ip,
                target_mac = %packet.target_mac,
                "ignoring ARP request not addressed to us"
            );
            ArpAction::Ignored
        }
    }
}
