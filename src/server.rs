use std::collections::HashSet;

use mio::event::Event;

use crate::prelude::*;
use crate::utils::session::{SessionStore, DEFAULT_SESSION_DIR};

const EVENTS_CAPACITY: usize = 1024;
const TICK_TIMEOUT: Duration = Duration::from_secs(1);

/// Owns the listening sockets, the connection table and the immutable
/// configuration, and drives everything from a single readiness loop.
/// Every fd has exactly one owner: a listener token or a connection token.
pub struct Server {
    pub config: Arc<Config>,
    pub connections: HashMap<Token, HttpConnection>,
    pub sessions: SessionStore,
    listeners: HashMap<Token, (TcpListener, u16)>,
    next_token: usize,
}

impl Server {
    /// Bind every distinct listen address in the configuration and register
    /// the listeners. Any bind failure is fatal at startup.
    pub fn new(config: Config, poll: &Poll) -> Result<Server> {
        let mut listeners = HashMap::new();
        let mut bound: HashSet<(String, u16)> = HashSet::new();
        let mut next_token = 0usize;

        for server in &config.http.servers {
            for listen in &server.listens {
                if listen.port == 0 {
                    return Err(ServerError::ListenAddress(format!(
                        "{}:{}",
                        listen.host, listen.port
                    )));
                }
                let key = (listen.bind_host().to_string(), listen.port);
                if !bound.insert(key) {
                    continue;
                }

                let addr_str = format!("{}:{}", listen.bind_host(), listen.port);
                let addr: SocketAddr = addr_str
                    .parse()
                    .map_err(|_| ServerError::ListenAddress(addr_str.clone()))?;
                let mut listener =
                    TcpListener::bind(addr).map_err(|e| ServerError::Bind(addr_str, e))?;

                let token = Token(next_token);
                next_token += 1;
                poll.registry()
                    .register(&mut listener, token, Interest::READABLE)?;
                info!("listening on {}", addr);
                listeners.insert(token, (listener, listen.port));
            }
        }

        if listeners.is_empty() {
            return Err(ServerError::NoListeners);
        }

        Ok(Server {
            config: Arc::new(config),
            connections: HashMap::new(),
            sessions: SessionStore::new(DEFAULT_SESSION_DIR),
            listeners,
            next_token,
        })
    }

    pub fn run(&mut self, mut poll: Poll) -> Result<()> {
        let mut events = Events::with_capacity(EVENTS_CAPACITY);

        loop {
            if let Err(e) = poll.poll(&mut events, Some(TICK_TIMEOUT)) {
                if e.kind() == ErrorKind::Interrupted {
                    continue;
                }
                return Err(e.into());
            }

            for event in events.iter() {
                let token = event.token();
                if self.listeners.contains_key(&token) {
                    self.accept_clients(&poll, token);
                } else {
                    self.handle_connection_event(&poll, event);
                }
            }

            self.tick(&poll);
        }
    }

    /// One readiness signal may carry several pending clients; accept until
    /// the listener would block.
    fn accept_clients(&mut self, poll: &Poll, token: Token) {
        loop {
            let accepted = match self.listeners.get(&token) {
                Some((listener, port)) => {
                    let port = *port;
                    listener.accept().map(|(stream, addr)| (stream, addr, port))
                }
                None => return,
            };

            match accepted {
                Ok((mut stream, addr, port)) => {
                    let client_token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) =
                        poll.registry()
                            .register(&mut stream, client_token, Interest::READABLE)
                    {
                        warn!("cannot register client {}: {}", addr, e);
                        continue;
                    }
                    debug!("client connected: {} -> :{}", addr, port);
                    self.connections
                        .insert(client_token, HttpConnection::new(stream, port));
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {}", e);
                    return;
                }
            }
        }
    }

    fn handle_connection_event(&mut self, poll: &Poll, event: &Event) {
        let token = event.token();
        let config = Arc::clone(&self.config);
        let Some(conn) = self.connections.get_mut(&token) else {
            return;
        };
        let mut drop_conn = event.is_error();

        if !drop_conn && (event.is_readable() || event.is_read_closed()) {
            match conn.read_data() {
                Ok(eof) => conn.peer_closed = conn.peer_closed || eof,
                Err(_) => drop_conn = true,
            }
            if !drop_conn {
                conn.touch();
                conn.process(&config);
                // peer went away with no response owed: nothing left to do
                if conn.peer_closed && conn.state != ClientState::Writing {
                    drop_conn = true;
                }
            }
        }

        if !drop_conn && conn.state == ClientState::Writing {
            match conn.write_data() {
                Ok(true) => {
                    if conn.close_after_write || conn.peer_closed {
                        drop_conn = true;
                    } else {
                        conn.reset_for_next();
                        // trailing bytes of the next request may already be
                        // buffered; give them a pass before sleeping
                        conn.process(&config);
                        let interest = if conn.state == ClientState::Writing {
                            Interest::READABLE | Interest::WRITABLE
                        } else {
                            Interest::READABLE
                        };
                        let _ = poll.registry().reregister(&mut conn.stream, token, interest);
                    }
                }
                Ok(false) => {
                    let _ = poll.registry().reregister(
                        &mut conn.stream,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    );
                }
                Err(_) => drop_conn = true,
            }
        }

        if drop_conn {
            self.cleanup(poll, token);
        }
    }

    /// Periodic sweep: idle connections out, expired sessions out.
    fn tick(&mut self, poll: &Poll) {
        let now = Instant::now();
        let expired: Vec<Token> = self
            .connections
            .iter()
            .filter(|(_, conn)| conn.is_idle(now))
            .map(|(token, _)| *token)
            .collect();
        for token in expired {
            debug!("closing idle connection {:?}", token);
            self.cleanup(poll, token);
        }

        if self.sessions.last_cleanup.elapsed() > SESSION_CLEANUP_INTERVAL {
            self.sessions.cleanup();
        }
    }

    fn cleanup(&mut self, poll: &Poll, token: Token) {
        if let Some(mut conn) = self.connections.remove(&token) {
            let _ = poll.registry().deregister(&mut conn.stream);
            conn.state = ClientState::Disconnected;
            debug!("connection {:?} closed", token);
        }
    }
}
