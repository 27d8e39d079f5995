//! Plugin-side dispatcher: speaks the HELLO handshake, reads REQ frames,
//! extracts the effective argument payload, and calls the registered
//! handler for that capability.

mod emitter;
mod errors;
mod payload;
mod peer;
mod runtime;

pub use emitter::Emitter;
pub use errors::RuntimeError;
pub use payload::extract_effective_payload;
pub use peer::{NoPeerInvoker, PeerInvoker};
pub use runtime::PluginRuntime;

#[cfg(test)]
mod tests {
    use super::*;
    use capkey::CapKey;
    use protocol::{read_frame, write_frame, Frame, FrameType, Limits, RequestId};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn register_raw_rejects_malformed_cap_urn() {
        let mut runtime = PluginRuntime::new();
        let err = runtime.register_raw("not-a-valid-cap!!", |_, _, _, _| Ok(())).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidCapUrn { .. }));
    }

    #[test]
    fn dispatch_calls_the_registered_handler_and_emits_end() {
        let called = Arc::new(AtomicBool::new(false));
        let called_in_handler = called.clone();

        let mut runtime = PluginRuntime::new();
        runtime
            .register_raw("action=echo;in=text/plain", move |_cap, payload, emitter, _peer| {
                called_in_handler.store(true, Ordering::SeqCst);
                assert_eq!(payload, b"hi");
                emitter.end()
            })
            .unwrap();

        let our_limits = Limits::DEFAULT;
        let our_manifest = b"test-manifest".to_vec();

        // Host side, scripted manually: HELLO then one REQ, then close.
        let mut host_to_plugin = Vec::new();
        let host_hello = protocol::build_hello(RequestId::new_uuid(), our_limits, b"host-manifest".to_vec());
        write_frame(&mut host_to_plugin, &host_hello, our_limits.max_frame).unwrap();

        let req_id = RequestId::new_uuid();
        let mut req = Frame::new(FrameType::Req, req_id.clone());
        req.cap = Some("action=echo;in=text/plain".to_string());
        req.content_type = Some("text/plain".to_string());
        req.payload = Some(b"hi".to_vec());
        write_frame(&mut host_to_plugin, &req, our_limits.max_frame).unwrap();

        let mut reader = Cursor::new(host_to_plugin);
        let mut plugin_to_host = Vec::new();
        runtime.run(&mut reader, &mut plugin_to_host, our_limits, our_manifest).unwrap();

        assert!(called.load(Ordering::SeqCst));

        let mut out = Cursor::new(plugin_to_host);
        let hello_reply = read_frame(&mut out, our_limits.max_frame).unwrap().unwrap();
        assert_eq!(hello_reply.frame_type, FrameType::Hello);

        let end_reply = read_frame(&mut out, our_limits.max_frame).unwrap().unwrap();
        assert_eq!(end_reply.frame_type, FrameType::End);
        assert_eq!(end_reply.id, req_id);
    }

    #[test]
    fn unknown_capability_gets_no_handler_error() {
        let runtime = PluginRuntime::new();
        let our_limits = Limits::DEFAULT;

        let mut host_to_plugin = Vec::new();
        let host_hello = protocol::build_hello(RequestId::new_uuid(), our_limits, b"host-manifest".to_vec());
        write_frame(&mut host_to_plugin, &host_hello, our_limits.max_frame).unwrap();

        let req_id = RequestId::new_uuid();
        let mut req = Frame::new(FrameType::Req, req_id.clone());
        req.cap = Some("action=nope".to_string());
        write_frame(&mut host_to_plugin, &req, our_limits.max_frame).unwrap();

        let mut reader = Cursor::new(host_to_plugin);
        let mut plugin_to_host = Vec::new();
        runtime
            .run(&mut reader, &mut plugin_to_host, our_limits, b"manifest".to_vec())
            .unwrap();

        let mut out = Cursor::new(plugin_to_host);
        let _hello = read_frame(&mut out, our_limits.max_frame).unwrap().unwrap();
        let err_frame = read_frame(&mut out, our_limits.max_frame).unwrap().unwrap();
        assert_eq!(err_frame.frame_type, FrameType::Err);
        assert_eq!(err_frame.error_code(), Some("NO_HANDLER"));
    }

    #[test]
    fn dispatch_reassembles_a_chunked_argument_substream() {
        let called = Arc::new(AtomicBool::new(false));
        let called_in_handler = called.clone();

        let mut runtime = PluginRuntime::new();
        runtime
            .register_raw("action=echo;in=text/plain", move |_cap, payload, emitter, _peer| {
                called_in_handler.store(true, Ordering::SeqCst);
                assert_eq!(payload, b"hello world".to_vec());
                emitter.end()
            })
            .unwrap();

        let our_limits = Limits::DEFAULT;
        let mut host_to_plugin = Vec::new();
        let host_hello = protocol::build_hello(RequestId::new_uuid(), our_limits, b"host-manifest".to_vec());
        write_frame(&mut host_to_plugin, &host_hello, our_limits.max_frame).unwrap();

        let req_id = RequestId::new_uuid();
        let mut req = Frame::new(FrameType::Req, req_id.clone());
        req.cap = Some("action=echo;in=text/plain".to_string());
        req.content_type = Some("text/plain".to_string());
        write_frame(&mut host_to_plugin, &req, our_limits.max_frame).unwrap();

        // Argument bytes arrive as a trailing substream rather than inline
        // on the REQ frame itself — small chunk size to force more than one.
        protocol::write_stream(
            &mut host_to_plugin,
            req_id.clone(),
            "args",
            "text/plain",
            b"hello world",
            4,
            our_limits.max_frame,
        )
        .unwrap();

        let mut reader = Cursor::new(host_to_plugin);
        let mut plugin_to_host = Vec::new();
        runtime
            .run(&mut reader, &mut plugin_to_host, our_limits, b"test-manifest".to_vec())
            .unwrap();

        assert!(called.load(Ordering::SeqCst));

        let mut out = Cursor::new(plugin_to_host);
        let hello_reply = read_frame(&mut out, our_limits.max_frame).unwrap().unwrap();
        assert_eq!(hello_reply.frame_type, FrameType::Hello);

        let end_reply = read_frame(&mut out, our_limits.max_frame).unwrap().unwrap();
        assert_eq!(end_reply.frame_type, FrameType::End);
        assert_eq!(end_reply.id, req_id);
    }

    #[test]
    fn no_peer_invoker_rejects_peer_calls() {
        let invoker = NoPeerInvoker;
        let err = invoker.invoke("action=whatever", b"").unwrap_err();
        assert!(matches!(err, RuntimeError::PeerInvokeNotSupported { .. }));
    }

    #[test]
    fn capkey_roundtrips_through_register_raw() {
        let mut runtime = PluginRuntime::new();
        let parsed = CapKey::parse("action=echo;in=text/plain").unwrap();
        runtime
            .register_raw(&parsed.canonical(), |_, _, _, _| Ok(()))
            .unwrap();
    }
}
