// kvmdeploy
// Copyright (C) Riff Labs Limited <team@riff.cc>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// long with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Shell scripts and network documents rendered from embedded handlebars
//! templates.
//!
//! Block tags always share their line with output, so what a template
//! produces never depends on standalone-line stripping.

use crate::cluster::net::Ipv4Cidr;
use crate::error::Result;
use crate::provisioners::{data_disk_name, NodeContext, ISO_NAME, SYSTEM_DISK};
use handlebars::{handlebars_helper, Context, Handlebars, Helper, HelperDef, JsonValue, RenderContext, RenderError, ScopedJson};
use once_cell::sync::Lazy;
use serde::Serialize;

const START_SCRIPT: &str = r#"#!/usr/bin/env bash
# {{name}}: VNC display :{{display}} (port {{port}})
set -e
cd "$(dirname "$0")"

create_tap() {
    local tap=$1 bridge=$2
    if ! ip link show dev "$bridge" >/dev/null 2>&1; then
        >&2 echo "err: bridge $bridge does not exist"
        return 1
    fi
    if ip link show dev "$tap" >/dev/null 2>&1; then
        ip link del dev "$tap"
    fi
    ip tuntap add dev "$tap" mode tap
    ip link set dev "$tap" mtu {{mtu}}
    ip link set dev "$tap" up
    ip link set dev "$tap" master "$bridge"
}

{{#each nics}}create_tap {{tap}} {{shell_quote bridge}}
{{/each}}
{{shell_quote qemubin}} \
    -name {{shell_quote name}} \
    -display vnc=:{{display}} \
    -machine pc,accel=kvm \
    -smp cpus={{cpus}} \
    -cpu host \
    -m {{shell_quote mem}} \
{{#each disks}}    -drive file={{file}},format=qcow2,if=none,id=D{{index}},cache=none \
    -device {{shell_quote device}},drive=D{{index}}{{serial}} \
{{/each}}    -drive file={{iso}},media=cdrom \
{{#each nics}}    -netdev tap,id=net{{index}},ifname={{tap}},script=no,downscript=no \
    -device virtio-net-pci,netdev=net{{index}},mac={{mac}} \
{{/each}}    -boot c \
    -pidfile qemu.pid \
    -daemonize
"#;

const STOP_SCRIPT: &str = r#"#!/usr/bin/env bash
# {{name}}
cd "$(dirname "$0")"

if [[ -f qemu.pid ]]; then
    kill "$(cat qemu.pid)" 2>/dev/null || true
    rm -f qemu.pid
fi
{{#each nics}}ip link del dev {{tap}} 2>/dev/null || true
{{/each}}"#;

const START_CLUSTER: &str = r#"#!/usr/bin/env bash
# cluster {{cluster}}, generated {{generated}}
cd "$(dirname "$0")"

{{#each nodes}}(cd {{shell_quote this}} && ./start.sh) || exit 1
{{/each}}"#;

const STOP_CLUSTER: &str = r#"#!/usr/bin/env bash
# cluster {{cluster}}, generated {{generated}}
cd "$(dirname "$0")"

{{#each nodes}}(cd {{shell_quote this}} && ./stop.sh)
{{/each}}"#;

// MACs must stay quoted: YAML 1.1 readers take 52:54:00:12:34:56 for a
// base-60 integer
const NETPLAN: &str = r#"version: 2
ethernets:
  eth0:
    match:
      macaddress: {{yaml_quote mac}}
    set-name: eth0
    addresses:
      - {{yaml_quote address}}
    gateway4: {{yaml_quote gateway}}
    nameservers:
      addresses:
        - {{yaml_quote nameserver}}
      search:
        - {{yaml_quote search}}
    mtu: {{mtu}}
"#;

const INTERFACES_META: &str = r#"network-interfaces: |
    iface eth0 inet static
    address {{address}}
    netmask {{netmask}}
    gateway {{gateway}}
"#;

static TEMPLATES: Lazy<Handlebars<'static>> = Lazy::new(|| {
    let mut handlebars = Handlebars::new();
    handlebars.set_strict_mode(true);
    handlebars.register_escape_fn(handlebars::no_escape);
    register_helpers(&mut handlebars);
    handlebars
});

pub struct ShellQuote;

impl HelperDef for ShellQuote {
    fn call_inner<'reg: 'rc, 'rc>(
        &self,
        h: &Helper<'reg, 'rc>,
        _: &'reg Handlebars,
        _: &'rc Context,
        _: &mut RenderContext<'reg, 'rc>,
    ) -> std::result::Result<ScopedJson<'reg, 'rc>, RenderError> {
        let word = match h.param(0).map(|p| p.value()) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(JsonValue::Number(n)) => n.to_string(),
            _ => return Err(RenderError::new("shell_quote: requires one string parameter")),
        };
        let quoted = shlex::try_quote(&word)
            .map_err(|e| RenderError::new(format!("shell_quote: cannot quote {:?}: {:?}", word, e)))?;
        Ok(ScopedJson::Derived(JsonValue::from(quoted.into_owned())))
    }
}

pub fn register_helpers(handlebars: &mut Handlebars) {
    {
        handlebars_helper!(yaml_quote: |v: str| format!("'{}'", v.replace('\'', "''")));
        handlebars.register_helper("yaml_quote", Box::new(yaml_quote))
    }
    handlebars.register_helper("shell_quote", Box::new(ShellQuote));
}

fn render<T: Serialize>(template: &str, data: &T) -> Result<String> {
    Ok(TEMPLATES.render_template(template, data)?)
}

#[derive(Serialize)]
struct NicView {
    index: usize,
    tap: String,
    bridge: String,
    mac: String,
}

#[derive(Serialize)]
struct DiskView {
    index: usize,
    file: String,
    device: String,
    serial: String,
}

#[derive(Serialize)]
struct LaunchView<'a> {
    name: &'a str,
    qemubin: &'a str,
    display: u16,
    port: u16,
    cpus: u32,
    mem: String,
    mtu: u32,
    iso: String,
    nics: Vec<NicView>,
    disks: Vec<DiskView>,
}

fn launch_view<'a>(ctx: &'a NodeContext<'_>) -> LaunchView<'a> {
    let node = ctx.node;
    let system = DiskView {
        index: 0,
        file: SYSTEM_DISK.to_string(),
        device: crate::cluster::DEFAULT_DISK_DEVICE.to_string(),
        serial: String::new(),
    };
    let data = node.data_disks.iter().enumerate().map(|(i, disk)| DiskView {
        index: i + 1,
        file: data_disk_name(i + 1),
        device: disk.device.clone(),
        serial: format!(",serial=qemu_drive_{}", i + 1),
    });
    LaunchView {
        name: &node.name,
        qemubin: &node.qemubin,
        display: ctx.port.display,
        port: ctx.port.port(),
        cpus: node.cpu,
        mem: node.mem.to_string(),
        mtu: node.mtu,
        iso: format!("{}/{}", crate::provisioners::CLOUD_INIT_DIR, ISO_NAME),
        nics: ctx.nics.iter().enumerate().map(|(index, nic)| NicView {
            index,
            tap: nic.tap.clone(),
            bridge: nic.bridge.clone(),
            mac: nic.mac.to_string(),
        }).collect(),
        disks: std::iter::once(system).chain(data).collect(),
    }
}

/// `start.sh`: recreate the taps, then launch the VM daemonized
pub fn start_script(ctx: &NodeContext) -> Result<String> {
    render(START_SCRIPT, &launch_view(ctx))
}

/// `stop.sh`: kill the VM by its pidfile and remove its taps
pub fn stop_script(ctx: &NodeContext) -> Result<String> {
    render(STOP_SCRIPT, &launch_view(ctx))
}

/// `start_cluster.sh`, nodes started in the order given
pub fn start_cluster_script(cluster: &str, nodes: &[&str]) -> Result<String> {
    render(START_CLUSTER, &serde_json::json!({
        "cluster": cluster,
        "generated": generated_at(),
        "nodes": nodes,
    }))
}

/// `stop_cluster.sh`, nodes stopped in reverse start order
pub fn stop_cluster_script(cluster: &str, nodes: &[&str]) -> Result<String> {
    let reversed: Vec<&str> = nodes.iter().rev().copied().collect();
    render(STOP_CLUSTER, &serde_json::json!({
        "cluster": cluster,
        "generated": generated_at(),
        "nodes": reversed,
    }))
}

fn generated_at() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// netplan v2 document binding the primary NIC, by MAC, to the static address
pub fn netplan(ctx: &NodeContext) -> Result<String> {
    let node = ctx.node;
    let address: Ipv4Cidr = node.ip_address.parse()?;
    render(NETPLAN, &serde_json::json!({
        "mac": ctx.primary_mac()?.to_string(),
        "address": address.to_string(),
        "gateway": node.gateway,
        "nameserver": node.nameserver,
        "search": node.search_domain(),
        "mtu": node.mtu,
    }))
}

/// meta-data `network-interfaces` block for guests that configure eth0 from it
pub fn interfaces_meta(ctx: &NodeContext) -> Result<String> {
    let node = ctx.node;
    let address: Ipv4Cidr = node.ip_address.parse()?;
    render(INTERFACES_META, &serde_json::json!({
        "address": address.address.to_string(),
        "netmask": address.netmask().to_string(),
        "gateway": node.gateway,
    }))
}
