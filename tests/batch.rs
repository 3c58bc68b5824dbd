//! A whole batch over a small tree of observing runs.

use anyhow::Result;
use serde_json::Value;
use std::{fs, path::Path};

use ultrarun::{
    batch::{run_batch, BatchConfig},
    catalogue::TargetCatalogue,
    lists::FailedTargets,
    simbad::{LookupHit, NameLookup},
};

#[derive(Default)]
struct CountingLookup {
    calls: Vec<String>,
}

impl NameLookup for CountingLookup {
    fn lookup(&mut self, name: &str) -> Result<Vec<LookupHit>> {
        self.calls.push(name.to_owned());

        if name == "Mystery star" {
            Ok(vec![LookupHit {
                name: "V* MY Sta".to_owned(),
                ra: 3.5,
                dec: -20.25,
            }])
        } else {
            Ok(Vec::new())
        }
    }
}

fn header(application: &str, target: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>
<exposure>
  <observatory_status>
    <name>La Palma</name>
    <telescope>William Herschel Telescope</telescope>
  </observatory_status>
  <instrument_status>
    <name>Ultracam</name>
    <application_status id=\"SDSU Exec\" name=\"{application}\"/>
    <parameter_status name=\"X_BIN_FAC\" value=\"1\"/>
    <parameter_status name=\"Y_BIN_FAC\" value=\"1\"/>
    <parameter_status name=\"GAIN_SPEED\" value=\"3227\"/>
  </instrument_status>
  <user>
    <target>{target}</target>
    <PI>Marsh</PI>
  </user>
</exposure>
"
    )
}

fn build_tree(root: &Path) {
    fs::write(
        root.join("TARGETS"),
        "AM~CVn  12 34 54.59 +37 37 44.1  AM~Canum~Venaticorum\n",
    )
    .unwrap();
    fs::write(root.join("SKIP_TARGETS"), "# nothing yet\n").unwrap();
    fs::write(
        root.join("FAILED_TARGETS"),
        "Old~failure 2009-11 2009-11-02 run004\n",
    )
    .unwrap();

    let rdir = root.join("2010-05");
    let night = rdir.join("2010-05-12");
    let data = night.join("data");
    fs::create_dir_all(&data).unwrap();
    fs::write(rdir.join("telescope"), "WHT\n").unwrap();

    fs::write(
        night.join("2010-05-12.dat"),
        "run003 Clear, good seeing\nrun004 Some cloud\n",
    )
    .unwrap();
    fs::write(
        night.join("2010-05-12.times"),
        "run003 2010-05-12 01:00:00 01:10:00 100 600.0 6.0\n",
    )
    .unwrap();

    let runs = [
        (1, "ap1_poweron", ""),
        (2, "ap3_fullframe", "Bias"),
        (3, "ap3_fullframe", "AM Canum Venaticorum"),
        (4, "ap3_fullframe", "Mystery star"),
        (5, "ap3_fullframe", "Mystery star"),
        (6, "ap3_fullframe", "Nothing here"),
        (8, "ap3_fullframe", "Old failure"),
    ];

    for (num, app, target) in runs {
        fs::write(data.join(format!("run{num:03}.xml")), header(app, target)).unwrap();
    }

    fs::write(data.join("run007.xml"), "<exposure>").unwrap();
}

#[test]
fn full_batch() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    build_tree(root);

    let cfg = BatchConfig::in_dir(root);
    let mut lookup = CountingLookup::default();
    let summary = run_batch(&cfg, Some(&mut lookup)).unwrap();

    assert_eq!(summary.runs, 7);
    assert_eq!(summary.bad_runs, 1);
    assert_eq!(summary.entries, 3);
    assert_eq!(summary.lookups, 2);
    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(lookup.calls, vec!["Mystery star", "Nothing here"]);

    let db: Value = serde_json::from_str(&fs::read_to_string(root.join("ultra.json")).unwrap()).unwrap();
    let db = db.as_array().unwrap();
    assert_eq!(db.len(), 3);

    assert_eq!(db[0]["id"], "AM CVn");
    assert_eq!(db[0]["num"], 3);
    assert_eq!(db[0]["run"], "2010-05");
    assert_eq!(db[0]["night"], "2010-05-12");
    assert_eq!(db[0]["expose"], 10.0);
    assert_eq!(db[0]["pi"], "Marsh");
    assert_eq!(db[0]["comment"], "Clear, good seeing");

    assert_eq!(db[1]["id"], "V* MY Sta");
    assert_eq!(db[1]["target"], "Mystery star");
    assert_eq!(db[1]["ra"], 3.5);
    assert_eq!(db[2]["num"], 5);
    assert_eq!(db[2]["comment"], "");

    let mut auto = TargetCatalogue::new();
    auto.read_file(root.join("AUTO_TARGETS")).unwrap();
    assert_eq!(auto.len(), 1);
    assert_eq!(auto.find("Mystery star").unwrap().name, "V* MY Sta");

    let failed = FailedTargets::load_optional(root.join("FAILED_TARGETS")).unwrap();
    assert_eq!(failed.names().collect::<Vec<_>>(), vec!["Nothing here", "Old failure"]);
    assert_eq!(
        failed.iter().find(|(n, _)| *n == "Nothing here").unwrap().1.run,
        6
    );
}

#[test]
fn second_batch_reuses_discoveries() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    build_tree(root);

    let cfg = BatchConfig::in_dir(root);
    run_batch(&cfg, Some(CountingLookup::default())).unwrap();

    let mut lookup = CountingLookup::default();
    let summary = run_batch(&cfg, Some(&mut lookup)).unwrap();

    assert!(lookup.calls.is_empty());
    assert_eq!(summary.entries, 3);
    assert_eq!(summary.discovered, 0);
    assert_eq!(summary.failed, 0);
}

#[test]
fn missing_skip_list_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    build_tree(root);
    fs::remove_file(root.join("SKIP_TARGETS")).unwrap();

    let cfg = BatchConfig::in_dir(root);
    assert!(run_batch(&cfg, Some(CountingLookup::default())).is_err());
    assert!(!root.join("ultra.json").exists());
}
