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

//! user-data documents.

use crate::error::Result;
use crate::provisioners::NodeContext;
use serde::Serialize;

pub const CLOUD_CONFIG_HEADER: &str = "#cloud-config";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CloudUser {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shell: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sudo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_passwd: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passwd: Option<String>,
    #[serde(rename = "ssh-authorized-keys")]
    pub ssh_authorized_keys: Vec<String>,
}

impl CloudUser {
    /// Passwordless-sudo account; its password is locked unless a hash is given
    pub fn sudoer(name: &str, password_hash: Option<&str>, keys: &[String]) -> Self {
        CloudUser {
            name: name.to_string(),
            home: Some(format!("/home/{}", name)),
            shell: Some(String::from("/bin/bash")),
            groups: Some(String::from("sudo")),
            sudo: Some(String::from("ALL=(ALL) NOPASSWD:ALL")),
            lock_passwd: Some(password_hash.is_none()),
            passwd: password_hash.map(String::from),
            ssh_authorized_keys: keys.to_vec(),
        }
    }

    pub fn root(keys: &[String]) -> Self {
        CloudUser {
            name: String::from("root"),
            home: None,
            shell: None,
            groups: None,
            sudo: None,
            lock_passwd: None,
            passwd: None,
            ssh_authorized_keys: keys.to_vec(),
        }
    }
}

/// A `#cloud-config` user-data document
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UserData {
    pub hostname: String,
    pub fqdn: String,
    pub manage_etc_hosts: bool,
    pub ssh_pwauth: bool,
    pub disable_root: bool,
    pub users: Vec<CloudUser>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bootcmd: Vec<String>,
}

impl UserData {
    pub fn for_node(ctx: &NodeContext) -> Self {
        let node = ctx.node;
        UserData {
            hostname: node.name.clone(),
            fqdn: node.fqdn(),
            manage_etc_hosts: false,
            ssh_pwauth: false,
            disable_root: false,
            users: vec![
                CloudUser::sudoer(ctx.guest_user, ctx.password_hash, &node.authorized_keys),
                CloudUser::root(&node.authorized_keys),
            ],
            bootcmd: Vec::new(),
        }
    }

    pub fn render(&self) -> Result<String> {
        Ok(format!("{}\n\n{}", CLOUD_CONFIG_HEADER, serde_yaml::to_string(self)?))
    }
}
