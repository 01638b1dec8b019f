//! Replay IPFIX traffic from a pcap/pcapng capture through one shared
//! Session and print counters (and, with --dump, every decoded record).

use ipfix_session::{DecodeError, Message, Session, SessionConfig};
use pcap_parser::pcapng::Block as PcapNgBlock;
use pcap_parser::traits::{PcapNGPacketBlock, PcapReaderIterator};
use pcap_parser::{Linktype, PcapBlockOwned, PcapError};
use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;

#[derive(Default)]
struct Stats {
    packets: u64,
    udp_payloads: u64,
    messages: u64,
    template_records: u64,
    data_records: u64,
    parse_errors: u64,
    first_error: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let aliasing = if let Some(pos) = raw_args.iter().position(|a| a == "--aliasing") {
        raw_args.remove(pos);
        true
    } else {
        false
    };
    let dump = if let Some(pos) = raw_args.iter().position(|a| a == "--dump") {
        raw_args.remove(pos);
        true
    } else {
        false
    };
    let pcap_path: PathBuf = raw_args
        .first()
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: dump_flows [--aliasing] [--dump] <capture.pcap>"))?;

    let session = Session::with_config(SessionConfig { id_aliasing: aliasing });
    let mut stats = Stats::default();
    let mut out = std::io::stdout();

    // Probe the magic at start of file for pcap vs pcapng.
    let mut probe = [0u8; 4];
    {
        let mut f = File::open(&pcap_path)?;
        f.read_exact(&mut probe)?;
    }
    let file = File::open(&pcap_path)?;
    if probe == [0x0a, 0x0d, 0x0d, 0x0a] {
        run_pcapng(file, &session, dump, &mut stats, &mut out)?;
    } else {
        run_legacy_pcap(file, &session, dump, &mut stats, &mut out)?;
    }

    eprintln!("pcap: {}", pcap_path.display());
    eprintln!("packets: {}", stats.packets);
    eprintln!("udp payloads: {}", stats.udp_payloads);
    eprintln!("messages: {}", stats.messages);
    eprintln!("template records: {}", stats.template_records);
    eprintln!("data records: {}", stats.data_records);
    eprintln!("parse errors: {}", stats.parse_errors);
    if let Some(err) = &stats.first_error {
        eprintln!("first error: {}", err);
    }
    Ok(())
}

fn run_legacy_pcap<R: Read>(
    file: R,
    session: &Session,
    dump: bool,
    stats: &mut Stats,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mut reader = pcap_parser::pcap::LegacyPcapReader::new(1 << 20, file)?;
    let mut linktype: Option<Linktype> = None;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                match block {
                    PcapBlockOwned::LegacyHeader(h) => linktype = Some(h.network),
                    PcapBlockOwned::Legacy(b) => {
                        stats.packets += 1;
                        let lt = linktype.unwrap_or(Linktype(1));
                        if let Some(payload) = udp_payload_from_linktype(lt, b.data) {
                            stats.udp_payloads += 1;
                            process_udp_payload(session, payload, dump, stats, out);
                        }
                    }
                    PcapBlockOwned::NG(_) => {}
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("pcap refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcap read error: {:?}", e)),
        }
    }
    Ok(())
}

fn run_pcapng<R: Read>(
    file: R,
    session: &Session,
    dump: bool,
    stats: &mut Stats,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mut reader = pcap_parser::pcapng::PcapNGReader::new(1 << 20, file)?;
    let mut if_linktypes: Vec<Linktype> = Vec::new();
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                if let PcapBlockOwned::NG(b) = block {
                    match &b {
                        PcapNgBlock::InterfaceDescription(idb) => if_linktypes.push(idb.linktype),
                        PcapNgBlock::EnhancedPacket(epb) => {
                            stats.packets += 1;
                            let lt = if_linktypes
                                .get(epb.if_id as usize)
                                .copied()
                                .unwrap_or(Linktype(1));
                            if let Some(payload) = udp_payload_from_linktype(lt, epb.packet_data()) {
                                stats.udp_payloads += 1;
                                process_udp_payload(session, payload, dump, stats, out);
                            }
                        }
                        PcapNgBlock::SimplePacket(spb) => {
                            stats.packets += 1;
                            let lt = if_linktypes.first().copied().unwrap_or(Linktype(1));
                            if let Some(payload) = udp_payload_from_linktype(lt, spb.packet_data()) {
                                stats.udp_payloads += 1;
                                process_udp_payload(session, payload, dump, stats, out);
                            }
                        }
                        _ => {}
                    }
                }
                reader.consume(offset);
            }
            Err(PcapError::Eof) => break,
            Err(PcapError::Incomplete(_)) => {
                reader
                    .refill()
                    .map_err(|e| anyhow::anyhow!("pcapng refill error: {:?}", e))?;
            }
            Err(e) => return Err(anyhow::anyhow!("pcapng read error: {:?}", e)),
        }
    }
    Ok(())
}

/// One datagram normally holds one message, but exporters may batch; keep
/// framing off the payload until it runs out.
fn process_udp_payload(
    session: &Session,
    payload: &[u8],
    dump: bool,
    stats: &mut Stats,
    out: &mut dyn Write,
) {
    let mut rest = payload;
    while !rest.is_empty() {
        match session.parse_reader(&mut rest) {
            Ok(message) => {
                stats.messages += 1;
                stats.template_records += message.template_records.len() as u64;
                stats.data_records += message.data_records.len() as u64;
                if dump {
                    let _ = write_message(out, &message);
                }
            }
            Err(e) => {
                stats.parse_errors += 1;
                if stats.first_error.is_none() {
                    stats.first_error = Some(e.to_string());
                }
                // A framing error means the rest of this datagram is not
                // trustworthy; resync at the next one.
                if matches!(e, DecodeError::EndOfInput | DecodeError::UnsupportedVersion(_)) {
                    break;
                }
            }
        }
    }
}

fn write_message(out: &mut dyn Write, message: &Message) -> std::io::Result<()> {
    let h = &message.header;
    writeln!(
        out,
        "=== message  domain {}  seq {}  export {}  templates {}  records {} ===",
        h.domain_id,
        h.sequence,
        h.export_time,
        message.template_records.len(),
        message.data_records.len()
    )?;
    for t in &message.template_records {
        if t.is_withdrawal() {
            writeln!(out, "  template {} withdrawn", t.template_id)?;
        } else {
            writeln!(out, "  template {}  ({} fields)", t.template_id, t.fields.len())?;
        }
    }
    for r in &message.data_records {
        writeln!(out, "  record (template {}):", r.template_id)?;
        for v in &r.values {
            let element = match v.element.enterprise {
                Some(pen) => format!("{}.{}", pen, v.element.id),
                None => format!("{}", v.element.id),
            };
            writeln!(out, "    {}: {}", element, hex_string(&v.bytes))?;
        }
    }
    Ok(())
}

fn hex_string(b: &[u8]) -> String {
    b.iter().map(|x| format!("{:02x}", x)).collect::<Vec<_>>().join(" ")
}

/// Extract UDP payload bytes from a captured frame, using linktype and
/// IPv4/UDP length fields. This avoids including Ethernet padding in short
/// frames.
fn udp_payload_from_linktype(linktype: Linktype, frame: &[u8]) -> Option<&[u8]> {
    let l3 = match linktype.0 {
        1 => ethernet_l3(frame)?,    // DLT_EN10MB
        101 => frame,                // DLT_RAW
        113 => linux_sll_l3(frame)?, // DLT_LINUX_SLL
        _ => return None,
    };
    ipv4_udp_payload(l3)
}

fn ethernet_l3(frame: &[u8]) -> Option<&[u8]> {
    if frame.len() < 14 {
        return None;
    }
    let mut off = 12usize;
    let mut ethertype = u16::from_be_bytes([frame[off], frame[off + 1]]);
    off += 2;
    // VLAN tags (802.1Q / 802.1ad): skip tag and read next ethertype.
    while ethertype == 0x8100 || ethertype == 0x88a8 {
        if frame.len() < off + 4 + 2 {
            return None;
        }
        off += 4;
        ethertype = u16::from_be_bytes([frame[off], frame[off + 1]]);
        off += 2;
    }
    match ethertype {
        0x0800 => Some(&frame[off..]), // IPv4
        _ => None,
    }
}

fn linux_sll_l3(frame: &[u8]) -> Option<&[u8]> {
    // Linux cooked capture v1 (SLL): 16-byte header, protocol at bytes 14..16
    if frame.len() < 16 {
        return None;
    }
    let proto = u16::from_be_bytes([frame[14], frame[15]]);
    match proto {
        0x0800 => Some(&frame[16..]),
        _ => None,
    }
}

fn ipv4_udp_payload(l3: &[u8]) -> Option<&[u8]> {
    if l3.len() < 20 {
        return None;
    }
    let ver_ihl = l3[0];
    if (ver_ihl >> 4) != 4 {
        return None;
    }
    let ihl = (ver_ihl & 0x0f) as usize * 4;
    if ihl < 20 || l3.len() < ihl {
        return None;
    }
    let total_len = u16::from_be_bytes([l3[2], l3[3]]) as usize;
    if total_len < ihl {
        return None;
    }
    let l3_trunc = if total_len <= l3.len() { &l3[..total_len] } else { l3 };
    if l3_trunc.len() < ihl + 8 || l3_trunc[9] != 17 {
        return None; // not UDP
    }
    let udp = &l3_trunc[ihl..];
    if udp.len() < 8 {
        return None;
    }
    let udp_len = u16::from_be_bytes([udp[4], udp[5]]) as usize;
    if udp_len < 8 || udp.len() < udp_len {
        return None;
    }
    Some(&udp[8..udp_len])
}
