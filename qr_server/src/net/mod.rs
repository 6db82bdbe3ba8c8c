//! The inbound UDP loop.
//!
//! One socket, one poll loop. Datagrams are decoded and handed to a worker
//! pool (handlers may block on the central or on a peer, so they must not run
//! on the poll thread); replies come back over a channel, a waker kicks the
//! loop, and an outgoing queue absorbs `WouldBlock` from the socket.

use crate::world::WorldManager;
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use mio::{net::UdpSocket, Events, Interest, Poll, Token, Waker};
use qr_common::{
  net::{self, Response, WireError, MAX_PACKET},
  util::ThreadPool,
};
use std::{collections::VecDeque, io, net::SocketAddr, sync::Arc};

pub mod handler;

const SOCKET: Token = Token(0);
const WAKE: Token = Token(1);

pub struct ConnectionManager {
  poll:   Poll,
  socket: UdpSocket,
  waker:  Arc<Waker>,
}

struct State {
  wm:      Arc<WorldManager>,
  replies: Sender<(SocketAddr, Vec<u8>)>,
  waker:   Arc<Waker>,
}

impl ConnectionManager {
  /// Binds the server socket. Separate from [`run`](Self::run) so the caller
  /// can read the bound address before serving, which matters when binding
  /// port 0.
  pub fn bind(addr: SocketAddr) -> io::Result<ConnectionManager> {
    let poll = Poll::new()?;
    let mut socket = UdpSocket::bind(addr)?;
    poll.registry().register(&mut socket, SOCKET, Interest::READABLE | Interest::WRITABLE)?;
    let waker = Arc::new(Waker::new(poll.registry(), WAKE)?);
    Ok(ConnectionManager { poll, socket, waker })
  }

  pub fn local_addr(&self) -> io::Result<SocketAddr> { self.socket.local_addr() }

  pub fn run(mut self, wm: Arc<WorldManager>) -> io::Result<()> {
    let mut events = Events::with_capacity(128);
    let (tx, rx): (Sender<(SocketAddr, Vec<u8>)>, Receiver<_>) = crossbeam_channel::bounded(1024);
    let pool = ThreadPool::auto("request handler", || State {
      wm:      wm.clone(),
      replies: tx.clone(),
      waker:   self.waker.clone(),
    });
    let mut outgoing: VecDeque<(SocketAddr, Vec<u8>)> = VecDeque::new();
    let mut buf = vec![0; MAX_PACKET];

    loop {
      loop {
        match self.poll.poll(&mut events, None) {
          Ok(()) => break,
          Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
          Err(e) => return Err(e),
        }
      }

      for event in events.iter() {
        match event.token() {
          WAKE => loop {
            match rx.try_recv() {
              Ok(reply) => outgoing.push_back(reply),
              Err(TryRecvError::Empty) => break,
              Err(_) => unreachable!(),
            }
          },
          SOCKET => {
            if event.is_readable() {
              loop {
                match self.socket.recv_from(&mut buf) {
                  Ok((n, src)) => {
                    let data = buf[..n].to_vec();
                    pool.execute(move |s| Self::handle_datagram(s, src, data));
                  }
                  Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                  Err(e) => return Err(e),
                }
              }
            }
          }
          _ => {}
        }
      }
      self.flush(&mut outgoing)?;
    }
  }

  /// Sends queued replies until the socket pushes back. Anything left stays
  /// queued for the next writable event.
  fn flush(&self, outgoing: &mut VecDeque<(SocketAddr, Vec<u8>)>) -> io::Result<()> {
    while let Some((addr, payload)) = outgoing.front() {
      let sent = self.socket.send_to(payload, *addr);
      match sent {
        Ok(_) => {
          outgoing.pop_front();
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
        Err(e) => return Err(e),
      }
    }
    Ok(())
  }

  fn handle_datagram(s: &State, src: SocketAddr, data: Vec<u8>) {
    let resp = match net::decode_request(&data) {
      Ok(req) => handler::handle(&s.wm, req),
      Err(WireError::UnknownType(ty)) => {
        warn!("unknown request type `{ty}` from {src}");
        Response::error("Unknown request type")
      }
      Err(e) => {
        warn!("bad request from {src}: {e}");
        Response::error(format!("invalid request: {e}"))
      }
    };
    let payload = match net::encode(&resp) {
      Ok(p) => p,
      Err(e) => {
        error!("could not encode reply to {src}: {e}");
        match net::encode(&Response::error("reply too large")) {
          Ok(p) => p,
          Err(_) => return,
        }
      }
    };
    if s.replies.send((src, payload)).is_ok() {
      let _ = s.waker.wake();
    }
  }
}
