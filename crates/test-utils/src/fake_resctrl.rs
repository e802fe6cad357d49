/*
 * Copyright 2024 Fluence Labs Limited
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use tempfile::TempDir;

/// What the fake resctrl mount exposes.
#[derive(Clone, Debug)]
pub struct FakeResctrlLayout {
    pub num_closids: u32,
    pub l3_cbm_mask: u64,
    /// Mounted with `-o cdp`, L3 is then split into L3CODE and L3DATA.
    pub l3_cdp: bool,
    pub l2_cbm_mask: Option<u64>,
    pub mon_features: Vec<&'static str>,
    pub l3_domains: Vec<u32>,
    pub l2_domains: Vec<u32>,
}

impl Default for FakeResctrlLayout {
    fn default() -> Self {
        Self {
            num_closids: 4,
            l3_cbm_mask: 0x7FF,
            l3_cdp: false,
            l2_cbm_mask: None,
            mon_features: vec!["llc_occupancy", "mbm_total_bytes", "mbm_local_bytes"],
            l3_domains: vec![0, 1],
            l2_domains: vec![0, 1, 2, 3],
        }
    }
}

/// A resctrl-like directory tree in a temporary directory.
/// Unlike the kernel it doesn't create pseudo files for new directories,
/// so every class directory is created upfront.
pub struct FakeResctrl {
    dir: TempDir,
}

impl FakeResctrl {
    pub fn new(layout: &FakeResctrlLayout) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let fake = Self { dir };
        fake.populate(layout)?;
        Ok(fake)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn read(&self, relative_path: impl AsRef<Path>) -> io::Result<String> {
        fs::read_to_string(self.path().join(relative_path))
    }

    pub fn write(&self, relative_path: impl AsRef<Path>, content: &str) -> io::Result<()> {
        let path = self.path().join(relative_path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    }

    /// Directories of the monitoring groups created so far.
    pub fn mon_groups(&self) -> io::Result<Vec<PathBuf>> {
        let mut groups = fs::read_dir(self.path().join("mon_groups"))?
            .map(|entry| entry.map(|entry| entry.path()))
            .collect::<io::Result<Vec<_>>>()?;
        groups.sort();
        Ok(groups)
    }

    /// Fills counters of a monitoring group for one L3 domain.
    pub fn set_mon_data(
        &self,
        group_dir: &Path,
        domain: u32,
        llc_occupancy: u64,
        mbm_total_bytes: u64,
        mbm_local_bytes: u64,
    ) -> io::Result<()> {
        let domain_dir = group_dir.join("mon_data").join(format!("mon_L3_{domain:02}"));
        fs::create_dir_all(&domain_dir)?;
        fs::write(domain_dir.join("llc_occupancy"), format!("{llc_occupancy}\n"))?;
        fs::write(
            domain_dir.join("mbm_total_bytes"),
            format!("{mbm_total_bytes}\n"),
        )?;
        fs::write(
            domain_dir.join("mbm_local_bytes"),
            format!("{mbm_local_bytes}\n"),
        )
    }

    /// Drops the files of a group directory, what rmdir does for pseudo files in resctrl.
    pub fn clear_group_files(&self, group_dir: &Path) -> io::Result<()> {
        for entry in fs::read_dir(group_dir)? {
            let path = entry?.path();
            if path.is_dir() {
                fs::remove_dir_all(path)?;
            } else {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    fn populate(&self, layout: &FakeResctrlLayout) -> io::Result<()> {
        let l3_name = if layout.l3_cdp { "L3CODE" } else { "L3" };
        self.write(
            format!("info/{l3_name}/num_closids"),
            &format!("{}\n", layout.num_closids),
        )?;
        self.write(
            format!("info/{l3_name}/cbm_mask"),
            &format!("{:x}\n", layout.l3_cbm_mask),
        )?;
        if layout.l3_cdp {
            self.write("info/L3DATA/num_closids", &format!("{}\n", layout.num_closids))?;
            self.write("info/L3DATA/cbm_mask", &format!("{:x}\n", layout.l3_cbm_mask))?;
        }
        if let Some(l2_cbm_mask) = layout.l2_cbm_mask {
            self.write("info/L2/num_closids", &format!("{}\n", layout.num_closids))?;
            self.write("info/L2/cbm_mask", &format!("{l2_cbm_mask:x}\n"))?;
        }
        if !layout.mon_features.is_empty() {
            let mut features = layout.mon_features.join("\n");
            features.push('\n');
            self.write("info/L3_MON/mon_features", &features)?;
        }
        fs::create_dir_all(self.path().join("mon_groups"))?;

        let schemata = default_schemata(layout);
        for class_id in 0..layout.num_closids {
            let class_dir = if class_id == 0 {
                PathBuf::new()
            } else {
                PathBuf::from(format!("COS{class_id}"))
            };
            self.write(class_dir.join("schemata"), &schemata)?;
            self.write(class_dir.join("cpus_list"), "\n")?;
            self.write(class_dir.join("tasks"), "")?;
        }

        Ok(())
    }
}

fn default_schemata(layout: &FakeResctrlLayout) -> String {
    let domains_line = |mask: u64, domains: &[u32]| {
        domains
            .iter()
            .map(|domain| format!("{domain}={mask:x}"))
            .collect::<Vec<_>>()
            .join(";")
    };

    let l3_line = domains_line(layout.l3_cbm_mask, &layout.l3_domains);
    let mut schemata = if layout.l3_cdp {
        format!("L3CODE:{l3_line}\nL3DATA:{l3_line}\n")
    } else {
        format!("L3:{l3_line}\n")
    };
    if let Some(l2_cbm_mask) = layout.l2_cbm_mask {
        schemata.push_str(&format!(
            "L2:{}\n",
            domains_line(l2_cbm_mask, &layout.l2_domains)
        ));
    }
    schemata
}
