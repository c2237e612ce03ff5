//! Fuzz target for PASE and CASE message decoding

#![no_main]

use hearth_core::case::messages::{Sigma1, Sigma2, Sigma3, TbeData2, TbeData3};
use hearth_core::pase::messages::{Pake1, Pake2, Pake3, PbkdfParamRequest, PbkdfParamResponse};
use hearth_core::tlv::TlvMessage;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = PbkdfParamRequest::decode(data);
    let _ = PbkdfParamResponse::decode(data);
    let _ = Pake1::decode(data);
    let _ = Pake2::decode(data);
    let _ = Pake3::decode(data);
    let _ = Sigma1::decode(data);
    let _ = Sigma2::decode(data);
    let _ = Sigma3::decode(data);
    let _ = TbeData2::decode(data);
    let _ = TbeData3::decode(data);
});
