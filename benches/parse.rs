//! Benchmark: parse_buffer vs parse_reader over captured traffic, a
//! template message (two templates) and a 1456-byte, 31-record data message.
//! parse_reader pays an extra allocation per call for the framing buffer;
//! the frame::read_message + parse_buffer combination amortizes it.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ipfix_session::{frame, Session};

const TEMPLATE_MSG: &str = "000a008c51ec4264000000000b20bdbe0002007c283b0008001c0010800c000400003c258003000800003c258004000800003c258012ffff00003c258001ffff00003c25801cffff00003c25001b0010c2ac0008000c0004800c000400003c258003000800003c258004000800003c258012ffff00003c258001ffff00003c25801cffff00003c2500080004";
const DATA_MSG: &str = "000a05b051ec4270000000000b20bdbec2ac05a0ac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b525043000116fcb8ac10200f00000000000000000000008c000000000000013a000f426974546f7272656e74204b525043005e489f46ac10200300000026000000000000019f0000000000000160000e4265696e6720616e616c797a656400c27ef905ac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b525043007aa7519c0808080800000000000000000000008d00000000000000550003444e5300ac102082ac10200f0000000000000000000000940000000000000147000f426974546f7272656e74204b52504300b228265c1859c1570000000000000000000000000000000000000064000f426974546f7272656e74204b52504300ac10200fac10200f0000000000000000000000920000000000000145000f426974546f7272656e74204b525043007b75a68ad92bb37f00000000000000000000006e0000000000000064000f426974546f7272656e74204b52504300ac10200fac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b525043004f972c247449d8f200000000000000000000006e0000000000000064000f426974546f7272656e74204b52504300ac10200fac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b5250430048b682a4ac10200f00000000000000000000008c000000000000013a000f426974546f7272656e74204b52504300595cc40dac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b5250430057451cc1ac10200f00000000000000000000008c000000000000013a000f426974546f7272656e74204b525043005465e5a8ac1020ff00000000000000000000000000000000000000af001a44726f70626f78204c414e2073796e6320646973636f766572790764726f70626f78ac102013ac10200f00000000000000000000008f000000000000014b000f426974546f7272656e74204b5250430001ab3c06ac10200f00000000000000000000008c000000000000013a000f426974546f7272656e74204b52504300befcacc8ffffffff00000000000000000000000000000000000000af001a44726f70626f78204c414e2073796e6320646973636f766572790764726f70626f78ac102013ac10200300000025000000000000019e0000000000000167000e4265696e6720616e616c797a656400c27ef905ac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b525043006ca28bcdac10200f000000000000000000000091000000000000011c000f426974546f7272656e74204b52504300b13531caac10200f000000000000000000000068000000000000005f000f426974546f7272656e74204b5250430053df9212ac10200f0000000000000000000000940000000000000159000f426974546f7272656e74204b525043005f43f0b2ac10200f0000000000000000000001220000000000000252000f426974546f7272656e74204b52504300567ce6fbac10200100000000000000000000005a000000000000005a00034e545000ac102080ac10200f00000000000000000000008c000000000000013a000f426974546f7272656e74204b5250430055550ef7ac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b52504300ba9322a2ac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b525043004579e7114b01bf5300000000000000000000006e0000000000000064000f426974546f7272656e74204b52504300ac10200fac10200f0000000000000000000000910000000000000136000f426974546f7272656e74204b525043005cf46adf";

fn bench_parse_buffer(c: &mut Criterion) {
    let template = hex::decode(TEMPLATE_MSG).expect("vector");
    let data = hex::decode(DATA_MSG).expect("vector");
    let session = Session::new();
    session.parse_buffer(&template).expect("template parse");

    c.bench_function("parse_buffer_data_msg", |b| {
        b.iter(|| {
            let m = session.parse_buffer(black_box(&data)).expect("parse");
            black_box(m.data_records.len())
        })
    });

    c.bench_function("parse_buffer_template_msg", |b| {
        b.iter(|| {
            let m = session.parse_buffer(black_box(&template)).expect("parse");
            black_box(m.template_records.len())
        })
    });
}

fn bench_parse_reader(c: &mut Criterion) {
    let template = hex::decode(TEMPLATE_MSG).expect("vector");
    let data = hex::decode(DATA_MSG).expect("vector");
    let session = Session::new();
    session.parse_buffer(&template).expect("template parse");

    c.bench_function("parse_reader_data_msg", |b| {
        b.iter(|| {
            let mut reader = data.as_slice();
            let m = session.parse_reader(&mut reader).expect("parse");
            black_box(m.data_records.len())
        })
    });

    c.bench_function("read_message_then_parse_buffer", |b| {
        let mut scratch = Vec::new();
        b.iter(|| {
            let mut reader = data.as_slice();
            frame::read_message(&mut reader, &mut scratch).expect("frame");
            let m = session.parse_buffer(&scratch).expect("parse");
            black_box(m.data_records.len())
        })
    });
}

criterion_group!(benches, bench_parse_buffer, bench_parse_reader);
criterion_main!(benches);
