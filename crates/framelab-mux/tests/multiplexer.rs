//! Drives a `Multiplexer` over socket pairs standing in for network links,
//! the child's pipes and the operator console.

use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::net::{UnixDatagram, UnixStream};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use framelab_link::{Capture, Link};
use framelab_mux::{ChildIo, Multiplexer, MuxError, Shutdown};
use framelab_proto::ether::insert_tag;
use framelab_proto::{
    MacAddress, MessageReader, MessageWriter, VlanTag, CONTROL, MAX_PAYLOAD,
};

const TIMEOUT: Duration = Duration::from_secs(5);

/// First byte of every datagram sent to a [`PairLink`].
const PLAIN: u8 = 0;
const TAGGED: u8 = 1;
const FOREIGN: u8 = 2;

/// A link backed by one end of a datagram socket pair.
///
/// Each datagram written by the test starts with a marker byte saying how
/// the capture should be reported (plain, with VLAN metadata, or foreign).
struct PairLink {
    sock: UnixDatagram,
    name: String,
    mac: MacAddress,
    mtu: usize,
}

impl AsRawFd for PairLink {
    fn as_raw_fd(&self) -> RawFd {
        self.sock.as_raw_fd()
    }
}

impl Link for PairLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn mac(&self) -> MacAddress {
        self.mac
    }

    fn mtu(&self) -> usize {
        self.mtu
    }

    fn recv_frame(&mut self, buf: &mut [u8]) -> io::Result<Capture> {
        let mut raw = vec![0u8; 70_000];
        let n = self.sock.recv(&mut raw)?;
        let (vlan, body) = match raw[0] {
            FOREIGN => return Ok(Capture::Foreign { ifindex: 99 }),
            TAGGED => (
                Some(VlanTag::new(u16::from_be_bytes([raw[1], raw[2]]))),
                &raw[3..n],
            ),
            _ => (None, &raw[1..n]),
        };
        buf[..body.len()].copy_from_slice(body);
        Ok(Capture::Frame {
            len: body.len(),
            vlan,
        })
    }

    fn send_frame(&mut self, frame: &[u8]) -> io::Result<usize> {
        self.sock.send(frame)
    }
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap().clone()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

struct Harness {
    peers: Vec<UnixDatagram>,
    /// What the multiplexer writes to the child.
    to_child: MessageReader<UnixStream>,
    /// Where the test writes as the child.
    from_child: Option<UnixStream>,
    console: Option<UnixStream>,
    console_out: SharedBuf,
    handle: JoinHandle<Result<Shutdown, MuxError>>,
}

fn mac(n: u8) -> MacAddress {
    MacAddress([0x02, 0, 0, 0, 0, n])
}

fn file(stream: UnixStream) -> File {
    File::from(OwnedFd::from(stream))
}

fn start(links: usize, mtu: usize, with_console: bool) -> Harness {
    let mut peers = Vec::new();
    let mut mux_links = Vec::new();
    for i in 0..links {
        let (ours, theirs) = UnixDatagram::pair().unwrap();
        theirs.set_read_timeout(Some(TIMEOUT)).unwrap();
        peers.push(theirs);
        mux_links.push(PairLink {
            sock: ours,
            name: format!("pair{i}"),
            mac: mac(i as u8 + 1),
            mtu,
        });
    }

    let (child_in_mux, child_in_test) = UnixStream::pair().unwrap();
    let (child_out_mux, child_out_test) = UnixStream::pair().unwrap();
    child_in_test.set_read_timeout(Some(TIMEOUT)).unwrap();

    let (console_test, console_mux) = if with_console {
        let (a, b) = UnixStream::pair().unwrap();
        (Some(a), Some(file(b)))
    } else {
        (None, None)
    };

    let console_out = SharedBuf::default();
    let mut mux = Multiplexer::new(
        mux_links,
        ChildIo {
            input: file(child_in_mux),
            output: file(child_out_mux),
        },
        console_mux,
        console_out.clone(),
    )
    .unwrap();
    let handle = std::thread::spawn(move || mux.run());

    let mut harness = Harness {
        peers,
        to_child: MessageReader::new(child_in_test),
        from_child: Some(child_out_test),
        console: console_test,
        console_out,
        handle,
    };

    let roster = harness.to_child.read_message().unwrap();
    assert_eq!(roster.kind, CONTROL);
    let expected: Vec<u8> = (1..=links as u8).flat_map(|n| mac(n).0).collect();
    assert_eq!(roster.payload.as_ref(), expected.as_slice());
    harness
}

impl Harness {
    fn child(&mut self) -> MessageWriter<&mut UnixStream> {
        MessageWriter::new(self.from_child.as_mut().unwrap())
    }

    fn capture(&self, link: usize, marker: &[u8], frame: &[u8]) {
        let mut datagram = marker.to_vec();
        datagram.extend_from_slice(frame);
        self.peers[link].send(&datagram).unwrap();
    }

    fn next(&mut self) -> (u16, Vec<u8>) {
        let msg = self.to_child.read_message().unwrap();
        (msg.kind, msg.payload.to_vec())
    }

    fn recv_on(&self, link: usize) -> Vec<u8> {
        let mut buf = vec![0u8; 70_000];
        let n = self.peers[link].recv(&mut buf).unwrap();
        buf.truncate(n);
        buf
    }

    /// Close the child's output and wait for the loop to end.
    fn finish(mut self) -> (Result<Shutdown, MuxError>, Vec<u8>) {
        self.from_child.take();
        let result = self.handle.join().unwrap();
        (result, self.console_out.contents())
    }

    /// Wait for the loop to end on its own (after a fatal error).
    fn join(self) -> Result<Shutdown, MuxError> {
        self.handle.join().unwrap()
    }
}

fn frame(dst: u8, src: u8, payload_len: usize) -> Vec<u8> {
    let mut frame = mac(dst).0.to_vec();
    frame.extend_from_slice(&mac(src).0);
    frame.extend_from_slice(&0x0800u16.to_be_bytes());
    frame.extend((0..payload_len).map(|i| (i % 251) as u8));
    frame
}

#[test]
fn roster_first_then_clean_child_shutdown() {
    let harness = start(3, 1500, true);
    let (result, console) = harness.finish();
    assert_eq!(result.unwrap(), Shutdown::ChildClosed);
    assert!(console.is_empty());
}

#[test]
fn captures_are_framed_with_link_index() {
    let mut h = start(2, 1500, true);
    let f = frame(0xFF, 7, 100);
    h.capture(1, &[PLAIN], &f);
    assert_eq!(h.next(), (2, f));

    let g = frame(0xFF, 8, 60);
    h.capture(0, &[PLAIN], &g);
    assert_eq!(h.next(), (1, g));

    assert_eq!(h.finish().0.unwrap(), Shutdown::ChildClosed);
}

#[test]
fn vlan_metadata_is_spliced_back_into_the_frame() {
    let mut h = start(1, 1500, false);
    let f = frame(0xFF, 7, 50);
    h.capture(0, &[TAGGED, 0x20, 0x05], &f);

    let (kind, payload) = h.next();
    assert_eq!(kind, 1);
    assert_eq!(payload, insert_tag(&f, VlanTag::new(0x2005)).unwrap());
    assert_eq!(&payload[12..16], &[0x81, 0x00, 0x20, 0x05]);

    h.finish().0.unwrap();
}

#[test]
fn short_capture_with_vlan_metadata_goes_out_untagged() {
    let mut h = start(1, 1500, false);
    h.capture(0, &[TAGGED, 0x00, 0x01], &[1, 2, 3]);
    assert_eq!(h.next(), (1, vec![1, 2, 3]));
    h.finish().0.unwrap();
}

#[test]
fn foreign_captures_are_discarded() {
    let mut h = start(1, 1500, false);
    let f = frame(0xFF, 9, 10);
    h.capture(0, &[FOREIGN], &frame(0xFF, 1, 10));
    h.capture(0, &[PLAIN], &f);
    assert_eq!(h.next(), (1, f));
    h.finish().0.unwrap();
}

#[test]
fn frames_from_one_link_keep_their_order() {
    let mut h = start(2, 1500, false);
    let frames: Vec<Vec<u8>> = (0..5).map(|n| frame(0xFF, 10 + n, 20)).collect();
    for f in &frames {
        h.capture(0, &[PLAIN], f);
    }
    h.capture(1, &[PLAIN], &frame(0xFF, 30, 20));

    let received: Vec<(u16, Vec<u8>)> = (0..6).map(|_| h.next()).collect();
    let from_first: Vec<Vec<u8>> = received
        .iter()
        .filter(|(kind, _)| *kind == 1)
        .map(|(_, payload)| payload.clone())
        .collect();
    assert_eq!(from_first, frames);
    assert_eq!(received.iter().filter(|(kind, _)| *kind == 2).count(), 1);

    h.finish().0.unwrap();
}

#[test]
fn slow_child_holds_captures_in_the_link() {
    let mut h = start(1, 1500, false);
    h.peers[0].set_nonblocking(true).unwrap();

    let numbered = |seq: u32| {
        let mut f = frame(0xFF, 7, 1386);
        f[14..18].copy_from_slice(&seq.to_be_bytes());
        f
    };

    // The child reads nothing, so once its pipe fills the loop stops
    // draining the link and the link's socket fills up too.
    let mut sent = 0u32;
    let mut stalled_for = 0;
    while stalled_for < 20 {
        assert!(sent < 50_000, "link never filled up");
        let mut datagram = vec![PLAIN];
        datagram.extend_from_slice(&numbered(sent));
        match h.peers[0].send(&datagram) {
            Ok(_) => {
                sent += 1;
                stalled_for = 0;
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                stalled_for += 1;
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => panic!("send failed: {err}"),
        }
    }
    assert!(sent > 0);

    for seq in 0..sent {
        assert_eq!(h.next(), (1, numbered(seq)));
    }

    // Nothing was held back or duplicated.
    h.peers[0].set_nonblocking(false).unwrap();
    h.capture(0, &[PLAIN], &numbered(sent));
    assert_eq!(h.next(), (1, numbered(sent)));

    h.finish().0.unwrap();
}

#[test]
fn console_lines_become_control_messages() {
    let mut h = start(1, 1500, true);
    let console = h.console.as_mut().unwrap();
    console.write_all(b"mac\nrest").unwrap();
    assert_eq!(h.next(), (CONTROL, b"mac\n".to_vec()));

    h.console.as_mut().unwrap().write_all(b" of line\n").unwrap();
    assert_eq!(h.next(), (CONTROL, b"rest of line\n".to_vec()));

    h.finish().0.unwrap();
}

#[test]
fn overlong_console_line_is_sent_as_one_message() {
    let mut h = start(1, 1500, true);
    let text: Vec<u8> = (0..70_000).map(|i| b'a' + (i % 26) as u8).collect();
    h.console.as_mut().unwrap().write_all(&text).unwrap();

    let (kind, first) = h.next();
    assert_eq!(kind, CONTROL);
    assert_eq!(first.len(), MAX_PAYLOAD);
    assert_eq!(first, &text[..MAX_PAYLOAD]);

    h.console.as_mut().unwrap().write_all(b"\n").unwrap();
    let (kind, rest) = h.next();
    assert_eq!(kind, CONTROL);
    assert_eq!(&rest[..rest.len() - 1], &text[MAX_PAYLOAD..]);
    assert_eq!(rest.last(), Some(&b'\n'));

    h.finish().0.unwrap();
}

#[test]
fn console_eof_ends_the_loop() {
    let mut h = start(1, 1500, true);
    h.console.take();
    assert_eq!(h.join().unwrap(), Shutdown::ConsoleClosed);
}

#[test]
fn child_frames_are_sent_on_the_named_link() {
    let mut h = start(2, 1500, false);
    let f = frame(3, 4, 40);
    h.child().send(2, &f).unwrap();
    assert_eq!(h.recv_on(1), f);

    h.peers[0].set_nonblocking(true).unwrap();
    let mut buf = [0u8; 16];
    let err = h.peers[0].recv(&mut buf).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::WouldBlock);

    h.finish().0.unwrap();
}

#[test]
fn child_control_text_goes_to_the_console() {
    let mut h = start(1, 1500, true);
    let f = frame(3, 4, 40);
    {
        let mut child = h.child();
        child.send_text("hello\n").unwrap();
        child.send(1, &f).unwrap();
        child.send_text("bye\n").unwrap();
    }
    assert_eq!(h.recv_on(0), f);

    let (result, console) = h.finish();
    assert_eq!(result.unwrap(), Shutdown::ChildClosed);
    assert_eq!(console, b"hello\nbye\n");
}

#[test]
fn empty_child_frames_are_dropped() {
    let mut h = start(1, 1500, false);
    let f = frame(3, 4, 10);
    h.child().send(1, b"").unwrap();
    h.child().send(1, &f).unwrap();
    assert_eq!(h.recv_on(0), f);
    h.finish().0.unwrap();
}

#[test]
fn child_frame_for_unknown_interface_is_fatal() {
    let mut h = start(2, 1500, false);
    h.child().send(3, &frame(1, 2, 10)).unwrap();
    assert!(matches!(
        h.join(),
        Err(MuxError::UnknownInterface {
            interface: 3,
            count: 2
        })
    ));
}

#[test]
fn child_size_below_header_is_fatal() {
    let mut h = start(1, 1500, false);
    h.from_child
        .as_mut()
        .unwrap()
        .write_all(&[0x00, 0x02, 0x00, 0x01])
        .unwrap();
    assert!(matches!(h.join(), Err(MuxError::SizeBelowHeader { size: 2 })));
}

#[test]
fn child_eof_mid_message_is_fatal() {
    let mut h = start(1, 1500, false);
    h.from_child
        .as_mut()
        .unwrap()
        .write_all(&[0x00, 0x10, 0x00, 0x01, 0xAA, 0xBB])
        .unwrap();
    let (result, _) = h.finish();
    assert!(matches!(
        result,
        Err(MuxError::ChildClosedMidMessage { buffered: 6 })
    ));
}

#[test]
fn capture_over_mtu_is_fatal() {
    let mut h = start(1, 100, false);
    let largest = frame(0xFF, 1, 100 + 4);
    assert_eq!(largest.len(), 100 + 18);
    h.capture(0, &[PLAIN], &largest);
    assert_eq!(h.next(), (1, largest));

    h.capture(0, &[PLAIN], &frame(0xFF, 1, 100 + 5));
    assert!(matches!(
        h.join(),
        Err(MuxError::FrameExceedsMtu {
            len: 119,
            limit: 118,
            ..
        })
    ));
}

#[test]
fn rejects_empty_link_set() {
    let (a, b) = UnixStream::pair().unwrap();
    let result = Multiplexer::<PairLink, Vec<u8>>::new(
        Vec::new(),
        ChildIo {
            input: file(a),
            output: file(b),
        },
        None,
        Vec::new(),
    );
    assert!(matches!(result, Err(MuxError::NoLinks)));
}
