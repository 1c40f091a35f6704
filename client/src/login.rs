use std::io::{self, BufRead, Write};

use tcpchat::protocol::{self, ACCEPTED_TOKEN};

/// Proposes usernames until the server accepts one.
///
/// `next_name` supplies candidates (`None` when the user gives up) and every
/// server reply, or local validation error, is passed to `report`. Names that
/// break the length rules are never sent.
pub fn login<R, W, N, P>(
    server_in: &mut R,
    server_out: &mut W,
    mut next_name: N,
    mut report: P,
) -> io::Result<Option<String>>
where
    R: BufRead,
    W: Write,
    N: FnMut() -> io::Result<Option<String>>,
    P: FnMut(&str),
{
    let mut reply = String::new();
    loop {
        let Some(name) = next_name()? else {
            return Ok(None);
        };

        if let Err(reason) = protocol::validate_name(&name) {
            report(&format!("ERROR : {}", reason));
            continue;
        }

        protocol::write_line(server_out, &name)?;
        if !protocol::read_line(server_in, &mut reply)? {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "server closed the connection",
            ));
        }
        report(&reply);

        if reply.contains(ACCEPTED_TOKEN) {
            return Ok(Some(name));
        }
    }
}
