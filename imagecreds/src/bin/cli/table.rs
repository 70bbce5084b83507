// SPDX-License-Identifier: Apache-2.0
// Copyright Authors of imagecreds

use comfy_table::Table;
use imagecreds::{DefaultCredentials, ImageCreds};

pub(crate) struct CredsTable(Table);

impl CredsTable {
    pub(crate) fn new_images(image_creds: &ImageCreds) -> Self {
        let mut table = Table::new();

        table.load_preset(comfy_table::presets::NOTHING);
        table.set_header(vec!["Image", "Registry Hosts"]);
        for (image, creds) in image_creds {
            let hosts = if creds.is_empty() {
                "None".to_string()
            } else {
                creds.hosts().join(", ")
            };
            table.add_row(vec![image.to_string(), hosts]);
        }
        CredsTable(table)
    }

    pub(crate) fn new_defaults(defaults: &DefaultCredentials) -> Self {
        let mut table = Table::new();

        table.load_preset(comfy_table::presets::NOTHING);
        table.set_header(vec!["Registry Host", "User", "Source"]);
        for host in defaults.hosts() {
            if let Some(auth) = defaults.get(host) {
                table.add_row(vec![host, auth.username(), auth.provenance()]);
            }
        }
        CredsTable(table)
    }

    pub(crate) fn print(&self) {
        println!("{self}\n")
    }
}

impl std::fmt::Display for CredsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
