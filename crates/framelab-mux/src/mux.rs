use std::fs::File;
use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};

use bytes::BytesMut;
use framelab_link::{Capture, Link};
use framelab_proto::ether::insert_tag_in_place;
use framelab_proto::{
    encode_message, MessageHeader, CONTROL, ETHERNET_HEADER_SIZE, HEADER_SIZE, MAX_INTERFACES,
    MAX_MESSAGE_SIZE, VLAN_OFFSET, VLAN_TAG_SIZE,
};
use tracing::{debug, info, trace, warn};

use crate::error::{MuxError, Result};

/// Why the loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// The operator console reached end-of-file.
    ConsoleClosed,
    /// The child closed its output at a message boundary.
    ChildClosed,
}

/// Counters reported when the loop ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxStats {
    /// Frames captured on links and delivered to the child.
    pub captured: u64,
    /// Frames the child asked to send and that went out on a link.
    pub injected: u64,
    /// Command-line lines delivered to the child.
    pub commands: u64,
    /// Control messages from the child printed to the console.
    pub console_messages: u64,
}

/// The two pipe ends connecting the multiplexer to its child.
#[derive(Debug)]
pub struct ChildIo {
    /// Written by the multiplexer, read by the child as its input.
    pub input: File,
    /// Written by the child, read by the multiplexer.
    pub output: File,
}

struct Slot<L> {
    link: L,
    buf: Vec<u8>,
    /// Bytes of the framed capture waiting in `buf`; `0` means empty.
    len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Link(usize),
    Console { end: usize },
}

#[derive(Debug, Clone, Copy)]
struct Inbound {
    source: Source,
    offset: usize,
}

#[derive(Debug, Clone, Copy)]
struct Outbound {
    link: usize,
    offset: usize,
    end: usize,
}

/// Positions of each descriptor in one iteration's poll set.
#[derive(Default)]
struct PollSet {
    fds: Vec<libc::pollfd>,
    child_input: Option<usize>,
    outbound: Option<usize>,
    links: Vec<Option<usize>>,
    child_output: Option<usize>,
    console: Option<usize>,
}

impl PollSet {
    fn add(&mut self, fd: RawFd, events: libc::c_short) -> usize {
        self.fds.push(libc::pollfd {
            fd,
            events,
            revents: 0,
        });
        self.fds.len() - 1
    }

    fn ready(&self, slot: Option<usize>) -> bool {
        const DONE: libc::c_short =
            libc::POLLIN | libc::POLLOUT | libc::POLLHUP | libc::POLLERR | libc::POLLNVAL;
        slot.is_some_and(|i| self.fds[i].revents & DONE != 0)
    }
}

/// Bridges network links, an operator console and a child process.
///
/// Everything captured on link `N` is handed to the child as a message of
/// type `N`; each complete line typed on the console becomes a control
/// message. Messages the child writes back are sent out on the link they
/// name, or printed to `console_out` if they are control text.
///
/// At most one message is in flight towards the child and at most one frame
/// towards a link; while either is pending, the matching inputs are simply
/// not polled.
pub struct Multiplexer<L, O> {
    slots: Vec<Slot<L>>,
    child: ChildIo,
    child_buf: Vec<u8>,
    child_filled: usize,
    child_eof: bool,
    console: Option<File>,
    console_buf: Vec<u8>,
    console_filled: usize,
    console_out: O,
    inbound: Option<Inbound>,
    outbound: Option<Outbound>,
    stats: MuxStats,
}

impl<L: Link, O: Write> Multiplexer<L, O> {
    /// Multiplex `links` (interface `N` is `links[N - 1]`) with `child`.
    ///
    /// `console` is the operator input; `None` runs without a command line.
    pub fn new(links: Vec<L>, child: ChildIo, console: Option<File>, console_out: O) -> Result<Self> {
        if links.is_empty() {
            return Err(MuxError::NoLinks);
        }
        if links.len() > MAX_INTERFACES {
            return Err(MuxError::TooManyLinks {
                count: links.len(),
                max: MAX_INTERFACES,
            });
        }
        Ok(Self {
            slots: links
                .into_iter()
                .map(|link| Slot {
                    link,
                    buf: vec![0; MAX_MESSAGE_SIZE],
                    len: 0,
                })
                .collect(),
            child,
            child_buf: vec![0; MAX_MESSAGE_SIZE],
            child_filled: 0,
            child_eof: false,
            console,
            console_buf: vec![0; MAX_MESSAGE_SIZE],
            console_filled: HEADER_SIZE,
            console_out,
            inbound: None,
            outbound: None,
            stats: MuxStats::default(),
        })
    }

    pub fn stats(&self) -> MuxStats {
        self.stats
    }

    fn link_count(&self) -> u16 {
        self.slots.len() as u16
    }

    /// Send the roster, then run until a shutdown condition or an error.
    pub fn run(&mut self) -> Result<Shutdown> {
        self.send_roster()?;
        set_nonblocking(self.child.input.as_raw_fd()).map_err(|source| MuxError::Io {
            context: "set child input non-blocking",
            source,
        })?;
        info!(links = self.slots.len(), "starting main loop");

        loop {
            if let Some(shutdown) = self.step()? {
                info!(?shutdown, stats = ?self.stats, "main loop finished");
                return Ok(shutdown);
            }
        }
    }

    /// One control message listing every link's MAC in index order.
    fn send_roster(&mut self) -> Result<()> {
        let roster: Vec<u8> = self
            .slots
            .iter()
            .flat_map(|slot| slot.link.mac().0)
            .collect();
        let mut wire = BytesMut::with_capacity(HEADER_SIZE + roster.len());
        encode_message(CONTROL, &roster, &mut wire)?;
        self.child
            .input
            .write_all(&wire)
            .map_err(|source| MuxError::Io {
                context: "send roster to child",
                source,
            })?;
        for (i, slot) in self.slots.iter().enumerate() {
            debug!(interface = i + 1, name = slot.link.name(), mac = %slot.link.mac(), "roster entry");
        }
        Ok(())
    }

    /// Run one poll iteration.
    fn step(&mut self) -> Result<Option<Shutdown>> {
        let mut set = self.poll_set();
        if !wait(&mut set.fds)? {
            return Ok(None);
        }

        if set.ready(set.console) {
            if let Some(shutdown) = self.read_console()? {
                return Ok(Some(shutdown));
            }
        }
        if set.ready(set.child_input) {
            self.write_inbound()?;
        }
        if set.ready(set.outbound) {
            self.write_outbound()?;
        }
        if self.inbound.is_none() {
            self.queue_command_line();
        }
        if set.ready(set.child_output) {
            self.read_child()?;
        }
        self.decode_child_output()?;
        if self.child_eof && self.outbound.is_none() {
            if self.child_filled == 0 {
                return Ok(Some(Shutdown::ChildClosed));
            }
            return Err(MuxError::ChildClosedMidMessage {
                buffered: self.child_filled,
            });
        }
        for i in 0..self.slots.len() {
            if set.ready(set.links[i]) && self.slots[i].len == 0 {
                self.capture(i)?;
            }
            if self.inbound.is_none() && self.slots[i].len != 0 {
                self.inbound = Some(Inbound {
                    source: Source::Link(i),
                    offset: 0,
                });
            }
        }
        Ok(None)
    }

    fn poll_set(&self) -> PollSet {
        let mut set = PollSet::default();
        if self.inbound.is_some() {
            set.child_input = Some(set.add(self.child.input.as_raw_fd(), libc::POLLOUT));
        }
        if let Some(job) = self.outbound {
            let fd = self.slots[job.link].link.as_raw_fd();
            set.outbound = Some(set.add(fd, libc::POLLOUT));
        }
        set.links = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let idx = (slot.len == 0).then(|| set.add(slot.link.as_raw_fd(), libc::POLLIN));
            set.links.push(idx);
        }
        if !self.child_eof && self.child_filled < self.child_buf.len() {
            set.child_output = Some(set.add(self.child.output.as_raw_fd(), libc::POLLIN));
        }
        if let Some(console) = &self.console {
            if self.console_filled < self.console_buf.len() {
                set.console = Some(set.add(console.as_raw_fd(), libc::POLLIN));
            }
        }
        set
    }

    fn read_console(&mut self) -> Result<Option<Shutdown>> {
        let Some(console) = self.console.as_mut() else {
            return Ok(None);
        };
        match console.read(&mut self.console_buf[self.console_filled..]) {
            Ok(0) => {
                info!("console closed");
                Ok(Some(Shutdown::ConsoleClosed))
            }
            Ok(n) => {
                self.console_filled += n;
                Ok(None)
            }
            Err(err) if is_retry(&err) => Ok(None),
            Err(source) => Err(MuxError::Io {
                context: "read console",
                source,
            }),
        }
    }

    /// Turn the first complete command line into a control message.
    fn queue_command_line(&mut self) {
        let line = &self.console_buf[HEADER_SIZE..self.console_filled];
        let end = match line.iter().position(|&b| b == b'\n') {
            Some(nl) => HEADER_SIZE + nl + 1,
            None if self.console_filled == self.console_buf.len() => {
                warn!("command line too long, sending it without a newline");
                self.console_filled
            }
            None => return,
        };
        let header = MessageHeader {
            size: end as u16,
            kind: CONTROL,
        };
        self.console_buf[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        self.inbound = Some(Inbound {
            source: Source::Console { end },
            offset: 0,
        });
        self.stats.commands += 1;
    }

    fn write_inbound(&mut self) -> Result<()> {
        let Some(mut job) = self.inbound else {
            return Ok(());
        };
        let pending = match job.source {
            Source::Link(i) => &self.slots[i].buf[job.offset..self.slots[i].len],
            Source::Console { end } => &self.console_buf[job.offset..end],
        };
        let written = match self.child.input.write(pending) {
            Ok(0) => {
                return Err(MuxError::WriteZero {
                    context: "write to child",
                })
            }
            Ok(n) => n,
            Err(err) if is_retry(&err) => return Ok(()),
            Err(source) => {
                return Err(MuxError::Io {
                    context: "write to child",
                    source,
                })
            }
        };
        job.offset += written;
        if written < pending.len() {
            self.inbound = Some(job);
            return Ok(());
        }

        match job.source {
            Source::Link(i) => {
                trace!(interface = i + 1, len = self.slots[i].len, "delivered frame");
                self.slots[i].len = 0;
                self.stats.captured += 1;
            }
            Source::Console { end } => {
                // Keep the header reservation in front of the next line.
                self.console_buf
                    .copy_within(end..self.console_filled, HEADER_SIZE);
                self.console_filled -= end - HEADER_SIZE;
            }
        }
        self.inbound = None;
        Ok(())
    }

    fn write_outbound(&mut self) -> Result<()> {
        let Some(mut job) = self.outbound else {
            return Ok(());
        };
        let slot = &mut self.slots[job.link];
        let frame = &self.child_buf[job.offset..job.end];
        let sent = match slot.link.send_frame(frame) {
            Ok(0) => {
                return Err(MuxError::WriteZero {
                    context: "send frame on link",
                })
            }
            Ok(n) => n,
            Err(err) if is_retry(&err) => return Ok(()),
            Err(source) => {
                return Err(MuxError::Io {
                    context: "send frame on link",
                    source,
                })
            }
        };
        job.offset += sent;
        if job.offset < job.end {
            self.outbound = Some(job);
            return Ok(());
        }

        trace!(interface = job.link + 1, len = job.end - HEADER_SIZE, "injected frame");
        self.consume_child_message(job.end);
        self.outbound = None;
        self.stats.injected += 1;
        Ok(())
    }

    fn read_child(&mut self) -> Result<()> {
        match self.child.output.read(&mut self.child_buf[self.child_filled..]) {
            Ok(0) => {
                info!("child closed its output");
                self.child_eof = true;
                Ok(())
            }
            Ok(n) => {
                self.child_filled += n;
                Ok(())
            }
            Err(err) if is_retry(&err) => Ok(()),
            Err(source) => Err(MuxError::Io {
                context: "read from child",
                source,
            }),
        }
    }

    /// Handle complete messages at the front of the child buffer.
    ///
    /// Control text is printed right away; the first frame becomes the
    /// outbound job and stops decoding until it has been sent.
    fn decode_child_output(&mut self) -> Result<()> {
        while self.outbound.is_none() {
            let Some(header) = MessageHeader::parse(&self.child_buf[..self.child_filled]) else {
                return Ok(());
            };
            let size = usize::from(header.size);
            if size < HEADER_SIZE {
                return Err(MuxError::SizeBelowHeader { size: header.size });
            }
            if size > self.child_filled {
                return Ok(());
            }

            if header.kind == CONTROL {
                self.print_console(size)?;
                self.consume_child_message(size);
                continue;
            }
            if header.kind > self.link_count() {
                return Err(MuxError::UnknownInterface {
                    interface: header.kind,
                    count: self.link_count(),
                });
            }
            if size == HEADER_SIZE {
                warn!(interface = header.kind, "dropping empty frame from child");
                self.consume_child_message(size);
                continue;
            }
            self.outbound = Some(Outbound {
                link: usize::from(header.kind) - 1,
                offset: HEADER_SIZE,
                end: size,
            });
        }
        Ok(())
    }

    fn print_console(&mut self, size: usize) -> Result<()> {
        let text = &self.child_buf[HEADER_SIZE..size];
        self.console_out
            .write_all(text)
            .and_then(|()| self.console_out.flush())
            .map_err(|source| MuxError::Io {
                context: "write console",
                source,
            })?;
        self.stats.console_messages += 1;
        Ok(())
    }

    fn consume_child_message(&mut self, size: usize) {
        self.child_buf.copy_within(size..self.child_filled, 0);
        self.child_filled -= size;
    }

    /// Receive one frame from link `i` into its empty slot.
    fn capture(&mut self, i: usize) -> Result<()> {
        let slot = &mut self.slots[i];
        let room = slot.buf.len() - VLAN_TAG_SIZE;
        let capture = match slot.link.recv_frame(&mut slot.buf[HEADER_SIZE..room]) {
            Ok(capture) => capture,
            Err(err) if is_retry(&err) => return Ok(()),
            Err(source) => {
                return Err(MuxError::Io {
                    context: "receive frame on link",
                    source,
                })
            }
        };

        let (mut len, vlan) = match capture {
            Capture::Foreign { ifindex } => {
                trace!(interface = i + 1, ifindex, "discarding capture for another interface");
                return Ok(());
            }
            Capture::Frame { len: 0, .. } => {
                return Err(MuxError::LinkClosed {
                    name: slot.link.name().to_string(),
                })
            }
            Capture::Frame { len, vlan } => (len, vlan),
        };

        if let Some(tag) = vlan {
            match insert_tag_in_place(&mut slot.buf[HEADER_SIZE..], len, tag) {
                Some(tagged) => len = tagged,
                None => debug!(
                    interface = i + 1,
                    len,
                    offset = VLAN_OFFSET,
                    "frame too short to restore its VLAN tag"
                ),
            }
        }

        let limit = slot.link.mtu() + ETHERNET_HEADER_SIZE + VLAN_TAG_SIZE;
        if len > limit {
            return Err(MuxError::FrameExceedsMtu {
                name: slot.link.name().to_string(),
                len,
                limit,
            });
        }

        let size = HEADER_SIZE + len;
        let header = MessageHeader {
            size: size as u16,
            kind: (i + 1) as u16,
        };
        slot.buf[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        slot.len = size;
        trace!(interface = i + 1, len, tagged = vlan.is_some(), "captured frame");
        Ok(())
    }
}

/// Block in `poll(2)`. Returns `false` if interrupted by a signal.
fn wait(fds: &mut [libc::pollfd]) -> Result<bool> {
    // SAFETY: `fds` is a valid, exclusively borrowed array of pollfd.
    let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(MuxError::Io {
            context: "poll",
            source: err,
        });
    }
    Ok(rc > 0)
}

fn is_retry(err: &io::Error) -> bool {
    matches!(err.kind(), ErrorKind::Interrupted | ErrorKind::WouldBlock)
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: fcntl on a descriptor we own; flags are read before being set.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(io::Error::last_os_error());
        }
        if libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
