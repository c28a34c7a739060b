//! Local answers to echo requests addressed to an attachment point

use crate::protocol::ethernet::FrameMut;
use crate::protocol::icmp::{self, IcmpType};
use crate::protocol::ipv4::Ipv4HeaderMut;
use crate::protocol::packet::{L3, L4Header, ParsedFrame};
use crate::Result;

/// True for an unfragmented echo request (type 8, code 0)
pub fn is_echo_request(parsed: &ParsedFrame) -> bool {
    match &parsed.l3 {
        L3::Ipv4(meta) => {
            let echo_request = IcmpType::EchoRequest as u8;
            !meta.more_fragments
                && matches!(
                    meta.l4,
                    L4Header::Icmp { icmp_type, code: 0, .. } if icmp_type == echo_request
                )
        }
        _ => false,
    }
}

/// Build an echo reply from a copy of `frame`: MACs and IP addresses
/// swapped, type set to echo reply, both checksums recomputed.
///
/// The reply is always checksummed in software.
pub fn echo_reply(frame: &[u8], parsed: &ParsedFrame) -> Result<Vec<u8>> {
    let mut reply = frame.to_vec();
    FrameMut::new(&mut reply)?.swap_macs();

    let mut ip = Ipv4HeaderMut::new(&mut reply[parsed.l3_offset..])?;
    let (src, dst) = (ip.src_addr(), ip.dst_addr());
    ip.set_src_addr(dst);
    ip.set_dst_addr(src);
    icmp::make_echo_reply(ip.payload_mut())?;
    ip.update_checksum();
    Ok(reply)
}
