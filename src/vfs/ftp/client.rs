//! Blocking FTP session: control channel commands and data transfers
//! (RFC 959).

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime};

use chrono::NaiveDateTime;
use tracing::debug;

use crate::core::{BackendKind, FsError, Result};

/// A server reply: three digit code and the (possibly multi-line) text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u32,
    pub message: String,
}

impl Reply {
    /// First digit of the code: 1 preliminary, 2 completed, 3 intermediate,
    /// 4 and 5 failures.
    pub fn class(&self) -> u32 {
        self.code / 100
    }

    fn into_error(self) -> FsError {
        FsError::Protocol {
            code: self.code,
            message: self.message,
        }
    }
}

/// Whether `err` is a server reply (as opposed to a transport failure).
pub fn is_refusal(err: &FsError) -> bool {
    matches!(err, FsError::Protocol { .. })
}

fn parse_code(line: &str) -> Result<u32> {
    line.get(..3)
        .filter(|code| code.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| FsError::Protocol {
            code: 0,
            message: format!("malformed reply: {line}"),
        })
}

/// Extracts the data address from a `227 Entering Passive Mode
/// (h1,h2,h3,h4,p1,p2)` reply.
fn parse_pasv(message: &str) -> Result<SocketAddr> {
    let malformed = || FsError::Protocol {
        code: 227,
        message: format!("malformed passive reply: {message}"),
    };
    let start = message
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(malformed)?;
    let numbers = message[start..]
        .split(|c: char| !c.is_ascii_digit())
        .filter(|part| !part.is_empty())
        .take(6)
        .map(|part| part.parse::<u8>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|_| malformed())?;
    let [a, b, c, d, high, low] = numbers[..] else {
        return Err(malformed());
    };
    let port = u16::from(high) << 8 | u16::from(low);
    Ok(SocketAddr::from(([a, b, c, d], port)))
}

/// Extracts the directory from a `257 "<dir>" ...` reply. Embedded quotes
/// are doubled.
fn parse_pwd(message: &str) -> Result<String> {
    let malformed = || FsError::Protocol {
        code: 257,
        message: format!("malformed directory reply: {message}"),
    };
    let start = message.find('"').ok_or_else(malformed)? + 1;
    let mut dir = String::new();
    let mut chars = message[start..].chars().peekable();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
                dir.push('"');
            } else {
                return Ok(dir);
            }
        } else {
            dir.push(c);
        }
    }
    Err(malformed())
}

/// Parses an `MDTM` timestamp (`YYYYMMDDHHMMSS[.fff]`, UTC).
fn parse_mdtm(message: &str) -> Result<SystemTime> {
    let stamp = message.trim();
    let parsed = stamp
        .get(..14)
        .and_then(|digits| NaiveDateTime::parse_from_str(digits, "%Y%m%d%H%M%S").ok())
        .ok_or_else(|| FsError::Protocol {
            code: 213,
            message: format!("malformed modification time: {stamp}"),
        })?;
    Ok(SystemTime::from(parsed.and_utc()))
}

enum DataChannel {
    Connected(TcpStream),
    Listening(TcpListener),
}

impl DataChannel {
    fn into_stream(self) -> io::Result<TcpStream> {
        match self {
            DataChannel::Connected(stream) => Ok(stream),
            DataChannel::Listening(listener) => listener.accept().map(|(stream, _)| stream),
        }
    }
}

/// An authenticated control connection.
pub struct FtpSession {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    passive: bool,
    timeout: Duration,
    home: Option<String>,
}

impl FtpSession {
    /// Connects and reads the server greeting.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let address = (host, port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| FsError::InvalidPath(format!("{host}:{port}")))?;
        let stream = TcpStream::connect_timeout(&address, timeout)?;
        stream.set_read_timeout(Some(timeout))?;
        stream.set_write_timeout(Some(timeout))?;
        let writer = stream.try_clone()?;
        let mut session = Self {
            reader: BufReader::new(stream),
            writer,
            passive: true,
            timeout,
            home: None,
        };
        let greeting = session.read_reply()?;
        if greeting.class() != 2 {
            return Err(greeting.into_error());
        }
        Ok(session)
    }

    pub fn set_passive(&mut self, passive: bool) {
        self.passive = passive;
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "FTP server closed the control connection",
            )
            .into());
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn read_reply(&mut self) -> Result<Reply> {
        let first = self.read_line()?;
        let code = parse_code(&first)?;
        let mut message = first.get(4..).unwrap_or_default().to_string();
        if first.as_bytes().get(3) == Some(&b'-') {
            let last = format!("{code} ");
            loop {
                let line = self.read_line()?;
                message.push('\n');
                if let Some(text) = line.strip_prefix(&last) {
                    message.push_str(text);
                    break;
                }
                message.push_str(&line);
            }
        }
        debug!(code, message = %message, "FTP <");
        Ok(Reply { code, message })
    }

    /// Sends a command and returns the first reply, whatever its code.
    pub fn command(&mut self, command: &str, argument: Option<&str>) -> Result<Reply> {
        let line = match argument {
            Some(argument) => format!("{command} {argument}"),
            None => command.to_string(),
        };
        if command == "PASS" {
            debug!("FTP > PASS ****");
        } else {
            debug!(command = %line, "FTP >");
        }
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\r\n")?;
        self.writer.flush()?;
        self.read_reply()
    }

    /// Sends a command and requires a reply of the given class.
    fn execute(&mut self, command: &str, argument: Option<&str>, class: u32) -> Result<Reply> {
        let reply = self.command(command, argument)?;
        if reply.class() == class {
            Ok(reply)
        } else {
            Err(reply.into_error())
        }
    }

    pub fn login(&mut self, user: &str, password: &str) -> Result<()> {
        let reply = self.command("USER", Some(user))?;
        match reply.class() {
            2 => Ok(()),
            3 => self.execute("PASS", Some(password), 2).map(|_| ()),
            _ => Err(reply.into_error()),
        }
    }

    /// Remembers the current directory as the one to return to with
    /// [`FtpSession::cwd_home`].
    pub fn mark_home(&mut self) -> Result<()> {
        self.home = Some(self.pwd()?);
        Ok(())
    }

    pub fn cwd_home(&mut self) -> Result<()> {
        match self.home.clone() {
            Some(home) => self.cwd(&home),
            None => Ok(()),
        }
    }

    pub fn binary(&mut self) -> Result<()> {
        self.execute("TYPE", Some("I"), 2).map(|_| ())
    }

    pub fn noop(&mut self) -> Result<()> {
        self.execute("NOOP", None, 2).map(|_| ())
    }

    pub fn pwd(&mut self) -> Result<String> {
        let reply = self.execute("PWD", None, 2)?;
        parse_pwd(&reply.message)
    }

    pub fn cwd(&mut self, dir: &str) -> Result<()> {
        self.execute("CWD", Some(dir), 2).map(|_| ())
    }

    pub fn size(&mut self, name: &str) -> Result<u64> {
        let reply = self.execute("SIZE", Some(name), 2)?;
        reply.message.trim().parse().map_err(|_| FsError::Protocol {
            code: reply.code,
            message: format!("malformed size: {}", reply.message),
        })
    }

    pub fn modified_time(&mut self, name: &str) -> Result<SystemTime> {
        let reply = self.execute("MDTM", Some(name), 2)?;
        parse_mdtm(&reply.message)
    }

    pub fn delete(&mut self, name: &str) -> Result<()> {
        self.execute("DELE", Some(name), 2).map(|_| ())
    }

    pub fn make_dir(&mut self, name: &str) -> Result<()> {
        self.execute("MKD", Some(name), 2).map(|_| ())
    }

    pub fn remove_dir(&mut self, name: &str) -> Result<()> {
        self.execute("RMD", Some(name), 2).map(|_| ())
    }

    pub fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        self.execute("RNFR", Some(from), 3)?;
        self.execute("RNTO", Some(to), 2).map(|_| ())
    }

    /// Names in the current directory. An empty directory is reported by
    /// some servers as `550 No files found`, which yields an empty list.
    pub fn name_list(&mut self) -> Result<Vec<String>> {
        let listing = self.transfer("NLST", None, |stream| {
            let mut text = String::new();
            stream.read_to_string(&mut text)?;
            Ok(text)
        });
        match listing {
            Ok(text) => Ok(text
                .lines()
                .map(|line| line.trim_end_matches('\r'))
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()),
            Err(FsError::Protocol { code, message })
                if code / 100 >= 4 && message.contains("No files found") =>
            {
                Ok(Vec::new())
            }
            Err(err) => Err(err),
        }
    }

    pub fn retrieve(&mut self, name: &str, sink: &mut dyn Write) -> Result<u64> {
        self.transfer("RETR", Some(name), |stream| io::copy(stream, sink))
    }

    pub fn store(&mut self, name: &str, source: &mut dyn Read) -> Result<u64> {
        self.transfer("STOR", Some(name), |stream| {
            let sent = io::copy(source, stream)?;
            stream.flush()?;
            Ok(sent)
        })
    }

    /// Ends the session. Errors are ignored; the connection is going away.
    pub fn quit(mut self) {
        let _ = self.command("QUIT", None);
    }

    fn open_data(&mut self) -> Result<DataChannel> {
        if self.passive {
            let reply = self.execute("PASV", None, 2)?;
            let address = parse_pasv(&reply.message)?;
            let stream = TcpStream::connect_timeout(&address, self.timeout)?;
            return Ok(DataChannel::Connected(stream));
        }
        let local = self.writer.local_addr()?;
        let IpAddr::V4(ip) = local.ip() else {
            return Err(FsError::unsupported("active mode over IPv6", BackendKind::Ftp));
        };
        let listener = TcpListener::bind((ip, 0))?;
        let port = listener.local_addr()?.port();
        let [a, b, c, d] = ip.octets();
        let argument = format!("{a},{b},{c},{d},{},{}", port >> 8, port & 0xff);
        self.execute("PORT", Some(&argument), 2)?;
        Ok(DataChannel::Listening(listener))
    }

    /// Runs a command with a data connection. The final reply is always read
    /// so the control channel stays in sync, even when `exchange` fails.
    fn transfer<T>(
        &mut self,
        command: &str,
        argument: Option<&str>,
        exchange: impl FnOnce(&mut TcpStream) -> io::Result<T>,
    ) -> Result<T> {
        let channel = self.open_data()?;
        let reply = self.command(command, argument)?;
        if reply.class() != 1 {
            return Err(reply.into_error());
        }
        let mut stream = channel.into_stream()?;
        stream.set_read_timeout(Some(self.timeout))?;
        let outcome = exchange(&mut stream);
        drop(stream);
        let done = self.read_reply();
        let value = outcome?;
        let done = done?;
        if done.class() != 2 {
            return Err(done.into_error());
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    mod parsing {
        use super::*;

        #[test]
        fn test_parse_pasv() {
            let address = parse_pasv("Entering Passive Mode (127,0,0,1,195,80).").unwrap();
            assert_eq!(address, SocketAddr::from(([127, 0, 0, 1], 50000)));
            assert!(parse_pasv("Entering Passive Mode").is_err());
            assert!(parse_pasv("(127,0,0,1,300,1)").is_err());
        }

        #[test]
        fn test_parse_pwd() {
            assert_eq!(parse_pwd("\"/home/ftp\" is current directory").unwrap(), "/home/ftp");
            assert_eq!(parse_pwd("\"/say \"\"hi\"\"\"").unwrap(), "/say \"hi\"");
            assert!(parse_pwd("no quotes").is_err());
        }

        #[test]
        fn test_parse_mdtm() {
            let time = parse_mdtm("20240102030405").unwrap();
            let seconds = time.duration_since(SystemTime::UNIX_EPOCH).unwrap().as_secs();
            assert_eq!(seconds, 1_704_164_645);
            assert_eq!(parse_mdtm("20240102030405.123").unwrap(), time);
            assert!(parse_mdtm("2024").is_err());
        }

        #[test]
        fn test_parse_code() {
            assert_eq!(parse_code("226 Transfer complete").unwrap(), 226);
            assert!(parse_code("OK").is_err());
        }
    }

    mod session {
        use super::*;

        /// Serves one connection, answering each expected command with the
        /// scripted reply lines.
        fn scripted_server(script: Vec<(&'static str, &'static str)>) -> u16 {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let port = listener.local_addr().unwrap().port();
            thread::spawn(move || {
                let (stream, _) = listener.accept().unwrap();
                let mut writer = stream.try_clone().unwrap();
                let mut reader = BufReader::new(stream);
                writer.write_all(b"220-Welcome\r\n220 Ready\r\n").unwrap();
                for (expected, reply) in script {
                    let mut line = String::new();
                    reader.read_line(&mut line).unwrap();
                    assert_eq!(line.trim_end(), expected);
                    writer.write_all(reply.as_bytes()).unwrap();
                }
            });
            port
        }

        #[test]
        fn test_login_and_simple_commands() -> Result<()> {
            let port = scripted_server(vec![
                ("USER alice", "331 Password required\r\n"),
                ("PASS secret", "230 Logged in\r\n"),
                ("PWD", "257 \"/data\" is current directory\r\n"),
                ("SIZE a.txt", "213 42\r\n"),
                ("CWD missing", "550 No such directory\r\n"),
                ("FEAT", "211-Features:\r\n MDTM\r\n SIZE\r\n211 End\r\n"),
            ]);
            let mut session = FtpSession::connect("127.0.0.1", port, Duration::from_secs(5))?;

            session.login("alice", "secret")?;
            assert_eq!(session.pwd()?, "/data");
            assert_eq!(session.size("a.txt")?, 42);
            let err = session.cwd("missing").unwrap_err();
            assert!(is_refusal(&err));
            assert!(matches!(err, FsError::Protocol { code: 550, .. }));

            let features = session.command("FEAT", None)?;
            assert_eq!(features.code, 211);
            assert_eq!(features.message, "Features:\n MDTM\n SIZE\nEnd");
            Ok(())
        }

        #[test]
        fn test_login_rejected() {
            let port = scripted_server(vec![("USER bob", "530 Not allowed\r\n")]);
            let mut session =
                FtpSession::connect("127.0.0.1", port, Duration::from_secs(5)).unwrap();
            assert!(matches!(
                session.login("bob", "x"),
                Err(FsError::Protocol { code: 530, .. })
            ));
        }

        #[test]
        fn test_empty_listing_reply() -> Result<()> {
            let data = TcpListener::bind("127.0.0.1:0").unwrap();
            let data_port = data.local_addr().unwrap().port();
            let pasv: &'static str = Box::leak(
                format!(
                    "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                    data_port >> 8,
                    data_port & 0xff
                )
                .into_boxed_str(),
            );
            let port = scripted_server(vec![
                ("PASV", pasv),
                ("NLST", "550 No files found\r\n"),
            ]);
            let mut session = FtpSession::connect("127.0.0.1", port, Duration::from_secs(5))?;

            assert!(session.name_list()?.is_empty());
            Ok(())
        }
    }
}
