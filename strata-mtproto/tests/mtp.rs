use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use strata_crypto::{AuthKey, Side};
use strata_mtproto::{
    DeserializeError, EncryptedSession, Message, Mtp, MtpConfig, MsgId, RequestError,
};
use strata_tl::{Blob, Deserializable, Identifiable, Serializable, enums, functions, types};

const SESSION_ID: i64 = 0x5eed;

fn key() -> AuthKey {
    let mut data = [0u8; 256];
    data.iter_mut().enumerate().for_each(|(i, b)| *b = (i as u8) ^ 0x5a);
    AuthKey::from_bytes(data)
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}

fn boxed<T: Identifiable + Serializable>(value: &T) -> Vec<u8> {
    let mut out = T::CONSTRUCTOR_ID.to_le_bytes().to_vec();
    value.serialize(&mut out);
    out
}

/// The server end of the connection: encrypts as the server, decrypts
/// client frames, hands out odd message ids.
struct Server {
    session: EncryptedSession,
    next_id: i64,
}

impl Server {
    fn new() -> Self {
        Self {
            session: EncryptedSession::with_session_id(key(), 0, 0, SESSION_ID),
            next_id: (now_secs() << 32) | 1,
        }
    }

    fn msg_id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 4;
        id
    }

    fn frame_with(&self, msg_id: i64, seq_no: i32, body: Vec<u8>) -> Vec<u8> {
        self.session.encode_as(&Message { msg_id: MsgId(msg_id), seq_no, body }, Side::Server)
    }

    fn frame(&mut self, body: Vec<u8>) -> Vec<u8> {
        let id = self.msg_id();
        self.frame_with(id, 1, body)
    }

    fn read(&self, mut frame: Vec<u8>) -> Message {
        self.session.decode_from(&mut frame, Side::Client).unwrap().message
    }
}

fn client() -> Mtp {
    Mtp::new(EncryptedSession::with_session_id(key(), 0x1234, 0, SESSION_ID), MtpConfig::default())
}

fn ping(id: i64) -> Vec<u8> {
    functions::Ping { ping_id: id }.to_bytes()
}

fn rpc_result(req: MsgId, result: Vec<u8>) -> Vec<u8> {
    boxed(&types::RpcResult { req_msg_id: req.0, result: Blob(result) })
}

fn container_members(body: &[u8]) -> Vec<types::ContainerMessage> {
    assert_eq!(strata_tl::peek_constructor(body), Some(types::MsgContainer::CONSTRUCTOR_ID));
    types::MsgContainer::from_bytes(&body[4..]).unwrap().messages.0
}

// ── Packing ───────────────────────────────────────────────────────────────────

#[test]
fn single_request_is_sent_alone() {
    let server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    let sent = server.read(mtp.finalize().unwrap());
    assert_eq!(sent.msg_id, id);
    assert_eq!(sent.seq_no, 1);
    assert_eq!(sent.body, ping(1));
    assert!(mtp.finalize().is_none());
}

#[test]
fn several_requests_share_a_container() {
    let server = Server::new();
    let mut mtp = client();
    let a = mtp.push(&ping(1)).unwrap();
    let b = mtp.push(&ping(2)).unwrap();
    let sent = server.read(mtp.finalize().unwrap());

    assert!(!sent.is_content_related());
    assert!(sent.msg_id > b);
    let members = container_members(&sent.body);
    assert_eq!(members.iter().map(|m| m.msg_id).collect::<Vec<_>>(), vec![a.0, b.0]);
    assert_eq!(members.iter().map(|m| m.seqno).collect::<Vec<_>>(), vec![1, 3]);
    assert_eq!(members[1].body, ping(2));
}

#[test]
fn container_ceiling_rejects_extra_messages() {
    let mut mtp = Mtp::new(
        EncryptedSession::with_session_id(key(), 0, 0, SESSION_ID),
        MtpConfig { max_container_messages: 2, ..MtpConfig::default() },
    );
    assert!(mtp.push(&ping(1)).is_some());
    assert!(mtp.push(&ping(2)).is_some());
    assert!(mtp.push(&ping(3)).is_none());
    assert!(mtp.finalize().is_some());
    assert!(mtp.push(&ping(3)).is_some());
}

#[test]
fn oversized_single_request_is_still_accepted() {
    let mut mtp = Mtp::new(
        EncryptedSession::with_session_id(key(), 0, 0, SESSION_ID),
        MtpConfig { max_container_bytes: 64, ..MtpConfig::default() },
    );
    assert!(mtp.push(&[0u8; 128]).is_some());
    assert!(mtp.push(&ping(1)).is_none());
}

// ── Results ───────────────────────────────────────────────────────────────────

#[test]
fn rpc_result_resolves_request_and_is_acknowledged() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(9)).unwrap();
    mtp.finalize().unwrap();

    let pong = enums::Pong::from(types::Pong { msg_id: id.0, ping_id: 9 }).to_bytes();
    let mut frame = server.frame(rpc_result(id, pong.clone()));
    let inbound = server.next_id - 4;
    let out = mtp.deserialize(&mut frame).unwrap();
    assert_eq!(out.rpc_results, vec![(id, Ok(pong))]);
    assert!(out.updates.is_empty());

    assert!(mtp.has_pending_service());
    let ack = server.read(mtp.finalize().unwrap());
    assert_eq!(ack.seq_no % 2, 0);
    let acked = types::MsgsAck::from_bytes(&ack.body[4..]).unwrap();
    assert_eq!(acked.msg_ids, vec![inbound]);
    assert!(!mtp.has_pending_service());
}

#[test]
fn rpc_error_becomes_typed_error() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let error = boxed(&types::RpcError { error_code: 420, error_message: "FLOOD_WAIT_3".into() });
    let out = mtp.deserialize(&mut server.frame(rpc_result(id, error))).unwrap();
    assert_eq!(
        out.rpc_results,
        vec![(id, Err(RequestError::Rpc { code: 420, message: "FLOOD_WAIT_3".into() }))]
    );
}

#[test]
fn gzip_packed_result_is_inflated() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let inner = vec![0xabu8; 400];
    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(&inner).unwrap();
    let packed = boxed(&types::GzipPacked { packed_data: gz.finish().unwrap() });

    let out = mtp.deserialize(&mut server.frame(rpc_result(id, packed))).unwrap();
    assert_eq!(out.rpc_results, vec![(id, Ok(inner))]);
}

#[test]
fn broken_gzip_result_fails_the_request() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let packed = boxed(&types::GzipPacked { packed_data: b"not gzip at all".to_vec() });
    let out = mtp.deserialize(&mut server.frame(rpc_result(id, packed))).unwrap();
    assert_eq!(out.rpc_results.len(), 1);
    assert_eq!(out.rpc_results[0].0, id);
    assert!(matches!(out.rpc_results[0].1, Err(RequestError::Deserialize(_))));
}

#[test]
fn truncated_rpc_error_fails_the_request() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let truncated = types::RpcError::CONSTRUCTOR_ID.to_le_bytes().to_vec();
    let out = mtp.deserialize(&mut server.frame(rpc_result(id, truncated))).unwrap();
    assert!(matches!(out.rpc_results.as_slice(), [(got, Err(RequestError::Deserialize(_)))] if *got == id));
}

#[test]
fn pong_outside_rpc_result_resolves_ping() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(5)).unwrap();
    mtp.finalize();

    let pong = boxed(&types::Pong { msg_id: id.0, ping_id: 5 });
    let out = mtp.deserialize(&mut server.frame(pong.clone())).unwrap();
    assert_eq!(out.rpc_results, vec![(id, Ok(pong))]);
}

#[test]
fn inbound_container_members_are_processed_in_seq_order() {
    let mut server = Server::new();
    let mut mtp = client();
    let a = mtp.push(&ping(1)).unwrap();
    let b = mtp.push(&ping(2)).unwrap();
    mtp.finalize();

    let first = server.msg_id();
    let second = server.msg_id();
    let container = types::MsgContainer {
        messages: strata_tl::RawVec(vec![
            types::ContainerMessage { msg_id: second, seqno: 5, body: rpc_result(b, vec![2, 0, 0, 0]) },
            types::ContainerMessage { msg_id: first, seqno: 3, body: rpc_result(a, vec![1, 0, 0, 0]) },
        ]),
    };
    let id = server.msg_id();
    let mut frame = server.frame_with(id, 6, boxed(&container));
    let out = mtp.deserialize(&mut frame).unwrap();
    assert_eq!(out.rpc_results, vec![(a, Ok(vec![1, 0, 0, 0])), (b, Ok(vec![2, 0, 0, 0]))]);
}

// ── Retry and failure ─────────────────────────────────────────────────────────

#[test]
fn stale_message_code_20_requests_resend() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let bad = boxed(&types::BadMsgNotification { bad_msg_id: id.0, bad_msg_seqno: 1, error_code: 20 });
    let out = mtp.deserialize(&mut server.frame(bad)).unwrap();
    assert_eq!(out.rpc_results, vec![(id, Err(RequestError::Retry))]);
}

#[test]
fn bad_salt_on_container_retries_every_member() {
    let mut server = Server::new();
    let mut mtp = client();
    let a = mtp.push(&ping(1)).unwrap();
    let b = mtp.push(&ping(2)).unwrap();
    let container = server.read(mtp.finalize().unwrap()).msg_id;

    let bad = boxed(&types::BadServerSalt {
        bad_msg_id: container.0,
        bad_msg_seqno: 4,
        error_code: 48,
        new_server_salt: 0x7777,
    });
    let out = mtp.deserialize(&mut server.frame(bad)).unwrap();
    assert_eq!(out.rpc_results, vec![(a, Err(RequestError::Retry)), (b, Err(RequestError::Retry))]);
    assert_eq!(mtp.session().salt, 0x7777);
}

#[test]
fn answered_member_is_not_retried_with_its_container() {
    let mut server = Server::new();
    let mut mtp = client();
    let a = mtp.push(&ping(1)).unwrap();
    let b = mtp.push(&ping(2)).unwrap();
    let container = server.read(mtp.finalize().unwrap()).msg_id;

    mtp.deserialize(&mut server.frame(rpc_result(a, vec![0; 4]))).unwrap();
    let bad = boxed(&types::BadMsgNotification { bad_msg_id: container.0, bad_msg_seqno: 4, error_code: 19 });
    let out = mtp.deserialize(&mut server.frame(bad)).unwrap();
    assert_eq!(out.rpc_results, vec![(b, Err(RequestError::Retry))]);
}

#[test]
fn fatal_codes_fail_the_request() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let bad = boxed(&types::BadMsgNotification { bad_msg_id: id.0, bad_msg_seqno: 1, error_code: 64 });
    let out = mtp.deserialize(&mut server.frame(bad)).unwrap();
    assert_eq!(out.rpc_results, vec![(id, Err(RequestError::BadMessage { code: 64 }))]);
}

#[test]
fn seqno_too_low_advances_sequence() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let bad = boxed(&types::BadMsgNotification { bad_msg_id: id.0, bad_msg_seqno: 1, error_code: 32 });
    mtp.deserialize(&mut server.frame(bad)).unwrap();
    mtp.finalize();
    mtp.push(&ping(2)).unwrap();
    let sent = server.read(mtp.finalize().unwrap());
    let seqs: Vec<i32> = if sent.is_content_related() {
        vec![sent.seq_no]
    } else {
        container_members(&sent.body).iter().map(|m| m.seqno).filter(|s| s % 2 == 1).collect()
    };
    assert_eq!(seqs, vec![35]);
}

#[test]
fn clock_skew_corrects_time_offset() {
    let server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let ahead = ((now_secs() + 500) << 32) | 1;
    let bad = boxed(&types::BadMsgNotification { bad_msg_id: id.0, bad_msg_seqno: 1, error_code: 16 });
    let out = mtp.deserialize(&mut server.frame_with(ahead, 1, bad)).unwrap();
    assert_eq!(out.rpc_results, vec![(id, Err(RequestError::Retry))]);
    assert!((mtp.session().time_offset - 500).abs() <= 1);
    assert!(mtp.session_mut().next_msg_id().secs() >= now_secs() + 499);
}

// ── Inbound filtering ─────────────────────────────────────────────────────────

#[test]
fn replayed_message_is_dropped() {
    let mut server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let frame = server.frame(rpc_result(id, vec![0; 4]));
    assert_eq!(mtp.deserialize(&mut frame.clone()).unwrap().rpc_results.len(), 1);
    assert!(mtp.deserialize(&mut frame.clone()).unwrap().rpc_results.is_empty());
}

#[test]
fn client_tagged_id_is_dropped() {
    let server = Server::new();
    let mut mtp = client();
    let id = mtp.push(&ping(1)).unwrap();
    mtp.finalize();

    let mut frame = server.frame_with((now_secs() << 32) | 4, 1, rpc_result(id, vec![0; 4]));
    assert!(mtp.deserialize(&mut frame).unwrap().rpc_results.is_empty());
    assert!(!mtp.has_pending_service());
}

#[test]
fn pushed_updates_are_handed_out() {
    let mut server = Server::new();
    let mut mtp = client();
    let body = boxed(&types::UpdatesTooLong {});
    let out = mtp.deserialize(&mut server.frame(body.clone())).unwrap();
    assert_eq!(out.updates, vec![body]);
    assert!(out.rpc_results.is_empty());
}

#[test]
fn unknown_constructor_is_ignored() {
    let mut server = Server::new();
    let mut mtp = client();
    let out = mtp.deserialize(&mut server.frame(vec![0xde, 0xad, 0xbe, 0xef, 0, 0, 0, 0])).unwrap();
    assert!(out.rpc_results.is_empty() && out.updates.is_empty());
}

#[test]
fn msgs_state_req_is_answered() {
    let mut server = Server::new();
    let mut mtp = client();

    let seen = server.msg_id();
    mtp.deserialize(&mut server.frame_with(seen, 2, boxed(&types::UpdatesTooLong {}))).unwrap();

    let unseen = server.msg_id() + 400;
    let future = ((now_secs() + 3600) << 32) | 1;
    let req_id = server.msg_id();
    let req = boxed(&types::MsgsStateReq { msg_ids: vec![seen, unseen, future] });
    mtp.deserialize(&mut server.frame_with(req_id, 2, req)).unwrap();

    let reply = server.read(mtp.finalize().unwrap());
    assert_eq!(strata_tl::peek_constructor(&reply.body), Some(types::MsgsStateInfo::CONSTRUCTOR_ID));
    let info = types::MsgsStateInfo::from_bytes(&reply.body[4..]).unwrap();
    assert_eq!(info.req_msg_id, req_id);
    assert_eq!(info.info, vec![4, 2, 3]);
}

#[test]
fn detailed_info_is_acknowledged() {
    let mut server = Server::new();
    let mut mtp = client();
    let answer = server.msg_id() + 1000;
    let info = boxed(&types::MsgNewDetailedInfo { answer_msg_id: answer, bytes: 16, status: 0 });
    let id = server.msg_id();
    mtp.deserialize(&mut server.frame_with(id, 2, info)).unwrap();

    let ack = server.read(mtp.finalize().unwrap());
    let acked = types::MsgsAck::from_bytes(&ack.body[4..]).unwrap();
    assert_eq!(acked.msg_ids, vec![answer]);
}

#[test]
fn transport_error_code_is_reported() {
    let mut mtp = client();
    let mut frame = (-404i32).to_le_bytes();
    assert_eq!(mtp.deserialize(&mut frame), Err(DeserializeError::Transport { code: -404 }));
}

#[test]
fn foreign_frame_is_a_decrypt_error() {
    let mut mtp = client();
    let other = EncryptedSession::with_session_id(key(), 0, 0, SESSION_ID + 1);
    let mut frame = other.encode_as(
        &Message { msg_id: MsgId((now_secs() << 32) | 1), seq_no: 1, body: vec![0; 8] },
        Side::Server,
    );
    assert!(matches!(mtp.deserialize(&mut frame), Err(DeserializeError::Decrypt(_))));
}
