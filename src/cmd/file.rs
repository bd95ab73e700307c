/*!
file.rs - bulk transfer commands.

  put <filePath> [remoteDir]   upload to every connected host
  get <remotePath>             download from every connected host

Both return only after their transfers finished (see `Fleet::put` /
`Fleet::get` for the join scope).
*/

use anyhow::Result;

use super::Shell;
use super::dispatch::Flow;
use super::registry::{CommandRegistry, ParamSpec};
use super::shared::{arg, required};

const GROUP: &str = "file";

pub fn register(registry: &mut CommandRegistry) {
    registry.register(
        GROUP,
        "put",
        put,
        "Upload a file to every connected host; '@' in the path expands to the host's download dir",
        "put <filePath> <remoteDir>",
        vec![
            ParamSpec::required("filePath", "string", "local file path"),
            ParamSpec::optional("remoteDir", "string", "remote directory, default the login home"),
        ],
    );
    registry.register(
        GROUP,
        "get",
        get,
        "Download a file from every connected host into <download root>/<host>/",
        "get <remotePath>",
        vec![ParamSpec::required("remotePath", "string", "remote file path")],
    );
}

fn put(shell: &mut Shell, args: &[String]) -> Result<Flow> {
    let file = required(args, 0, "filePath", "put <filePath> <remoteDir>")?;
    let reports = shell.fleet.put(file, arg(args, 1));
    summarize("put", reports.iter().filter(|r| r.is_ok()).count(), reports.len());
    Ok(Flow::Continue)
}

fn get(shell: &mut Shell, args: &[String]) -> Result<Flow> {
    let remote = required(args, 0, "remotePath", "get <remotePath>")?;
    let reports = shell.fleet.get(remote);
    summarize("get", reports.iter().filter(|r| r.is_ok()).count(), reports.len());
    Ok(Flow::Continue)
}

fn summarize(op: &str, ok: usize, total: usize) {
    if total == 0 {
        log::warn!("{op}: no host connected");
    } else if ok < total {
        log::warn!("{op}: {ok}/{total} host(s) succeeded");
    } else {
        log::debug!("{op}: {ok}/{total} host(s) succeeded");
    }
}
