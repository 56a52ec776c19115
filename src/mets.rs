use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::checksum::ChecksumAlgorithm;
use crate::config::SipConfig;
use crate::error::{Result, SipError};
use crate::job::{Artifact, JobId, VerifiedJob};

const METS_XMLNS: &str = "http://www.loc.gov/METS/";
const XLINK_XMLNS: &str = "http://www.w3.org/1999/xlink";

/// Builds one METS record per verified job.
///
/// The creation timestamp is injected so identical inputs serialize to
/// identical bytes; the pipeline passes the wall clock.
pub struct MetsBuilder<'a> {
    config: &'a SipConfig,
    created: DateTime<Utc>,
}

impl<'a> MetsBuilder<'a> {
    pub fn new(config: &'a SipConfig, created: DateTime<Utc>) -> Self {
        Self { config, created }
    }

    /// Walk the verified artifact set (already stable-sorted by path)
    /// and populate the document. An unreadable artifact aborts the
    /// whole build; no partial document is returned.
    pub fn build(&self, job: &VerifiedJob) -> Result<MetsDocument> {
        let mut doc = MetsDocument::new(job.id.clone(), self.created, self.config.checksum);
        for artifact in &job.artifacts {
            let checksum = artifact.checksum(&job.job_dir, self.config.checksum)?;
            doc.add_artifact(artifact, checksum)?;
        }
        Ok(doc)
    }
}

/// In-memory METS record, mutated incrementally as artifacts are
/// discovered, then frozen with [`MetsDocument::finalize`].
#[derive(Debug)]
pub struct MetsDocument {
    id: JobId,
    created: DateTime<Utc>,
    algorithm: ChecksumAlgorithm,
    /// File inventory, in insertion (= path-sorted) order.
    files: Vec<FileEntry>,
    /// Structural map references: (group, file id), in insertion order.
    map_refs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
struct FileEntry {
    file_id: String,
    /// Payload path relative to the bag root (`data/warcs/...`).
    data_path: String,
    group: String,
    mimetype: String,
    size: u64,
    checksum: String,
}

#[derive(Debug, Clone)]
pub struct RecordedFile {
    pub checksum: String,
    pub size: u64,
}

impl MetsDocument {
    fn new(id: JobId, created: DateTime<Utc>, algorithm: ChecksumAlgorithm) -> Self {
        Self {
            id,
            created,
            algorithm,
            files: Vec::new(),
            map_refs: Vec::new(),
        }
    }

    fn add_artifact(&mut self, artifact: &Artifact, checksum: String) -> Result<()> {
        let data_path = format!("data/{}", artifact.relative_path.display());
        if self.files.iter().any(|f| f.data_path == data_path) {
            return Err(SipError::MetsBuild(format!(
                "duplicate artifact path: {data_path}"
            )));
        }
        let file_id = format!("f{:04}", self.files.len() + 1);
        self.map_refs.push((artifact.group.clone(), file_id.clone()));
        self.files.push(FileEntry {
            file_id,
            data_path,
            group: artifact.group.clone(),
            mimetype: artifact.mimetype.clone(),
            size: artifact.size,
            checksum,
        });
        Ok(())
    }

    /// Freeze the document. Validates the no-orphan invariant: every
    /// structural-map reference must resolve to a file-inventory entry.
    pub fn finalize(self) -> Result<FinalizedMets> {
        let inventory: BTreeSet<&str> = self.files.iter().map(|f| f.file_id.as_str()).collect();
        for (_, file_id) in &self.map_refs {
            if !inventory.contains(file_id.as_str()) {
                return Err(SipError::MetsBuild(format!(
                    "structural map references {file_id} which is absent from the file inventory"
                )));
            }
        }

        let mut recorded = BTreeMap::new();
        for file in &self.files {
            recorded.insert(
                file.data_path.clone(),
                RecordedFile {
                    checksum: file.checksum.clone(),
                    size: file.size,
                },
            );
        }

        Ok(FinalizedMets {
            xml: self.to_xml_model(),
            recorded,
            algorithm: self.algorithm,
            object_id: self.id.to_string(),
        })
    }

    fn to_xml_model(&self) -> MetsXml {
        // Group files for fileSec/structMap; BTreeMap keeps group
        // ordering stable regardless of discovery order.
        let mut groups: BTreeMap<&str, Vec<&FileEntry>> = BTreeMap::new();
        for file in &self.files {
            groups.entry(file.group.as_str()).or_default().push(file);
        }

        let file_grps = groups
            .iter()
            .map(|(use_name, files)| FileGrp {
                use_attr: (*use_name).to_string(),
                files: files
                    .iter()
                    .map(|f| MetsFile {
                        id: f.file_id.clone(),
                        mimetype: f.mimetype.clone(),
                        size: f.size,
                        checksum: f.checksum.clone(),
                        checksum_type: self.algorithm.mets_name().to_string(),
                        locat: FLocat {
                            loctype: "URL".to_string(),
                            href: f.data_path.clone(),
                        },
                    })
                    .collect(),
            })
            .collect();

        let divs = groups
            .iter()
            .map(|(use_name, files)| StructDiv {
                div_type: (*use_name).to_string(),
                fptrs: files
                    .iter()
                    .map(|f| Fptr {
                        file_id: f.file_id.clone(),
                    })
                    .collect(),
            })
            .collect();

        MetsXml {
            xmlns_mets: METS_XMLNS,
            xmlns_xlink: XLINK_XMLNS,
            objid: self.id.to_string(),
            label: format!("Crawl job {}", self.id),
            header: MetsHdr {
                createdate: self.created.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
                agent: MetsAgent {
                    role: "CREATOR".to_string(),
                    agent_type: "OTHER".to_string(),
                    other_type: "SOFTWARE".to_string(),
                    name: format!(
                        "{} {}",
                        env!("CARGO_PKG_NAME"),
                        env!("CARGO_PKG_VERSION")
                    ),
                },
            },
            amd: AmdSec {
                id: "amd0001".to_string(),
                source: SourceMd {
                    id: "source0001".to_string(),
                    wrap: MdWrap {
                        mdtype: "OTHER".to_string(),
                        other_mdtype: "CRAWL-JOB".to_string(),
                        data: XmlData {
                            job: CrawlJobMd {
                                stream: self.id.stream.clone(),
                                launch: self.id.launch.clone(),
                            },
                        },
                    },
                },
            },
            file_sec: FileSec { groups: file_grps },
            struct_map: StructMap {
                map_type: "physical".to_string(),
                div: CrawlDiv {
                    div_type: "crawl".to_string(),
                    label: self.id.to_string(),
                    children: divs,
                },
            },
        }
    }
}

/// A frozen METS record ready for serialization, plus the checksum
/// inventory the bag packager reuses.
#[derive(Debug)]
pub struct FinalizedMets {
    xml: MetsXml,
    recorded: BTreeMap<String, RecordedFile>,
    algorithm: ChecksumAlgorithm,
    object_id: String,
}

impl FinalizedMets {
    pub fn object_id(&self) -> &str {
        &self.object_id
    }

    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }

    /// Recorded payload files keyed by bag-relative path (`data/...`).
    pub fn recorded_files(&self) -> &BTreeMap<String, RecordedFile> {
        &self.recorded
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut body = String::new();
        let mut serializer = quick_xml::se::Serializer::with_root(&mut body, Some("mets:mets"))?;
        serializer.indent(' ', 2);
        self.xml.serialize(serializer)?;
        Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{body}\n"))
    }
}

/// Serialize and write the record, via a temp file so a failed write
/// never leaves a truncated document behind.
pub fn write_document(mets: &FinalizedMets, path: &Path) -> Result<()> {
    let xml = mets.to_xml()?;
    let parent = path.parent().ok_or_else(|| {
        SipError::MetsBuild(format!("mets path has no parent: {}", path.display()))
    })?;
    std::fs::create_dir_all(parent)?;
    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp_path, xml.as_bytes())?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// Serde model for the XML layout. Field order here is serialization
// order, so it must stay fixed.

#[derive(Debug, Serialize)]
struct MetsXml {
    #[serde(rename = "@xmlns:mets")]
    xmlns_mets: &'static str,
    #[serde(rename = "@xmlns:xlink")]
    xmlns_xlink: &'static str,
    #[serde(rename = "@OBJID")]
    objid: String,
    #[serde(rename = "@LABEL")]
    label: String,
    #[serde(rename = "mets:metsHdr")]
    header: MetsHdr,
    #[serde(rename = "mets:amdSec")]
    amd: AmdSec,
    #[serde(rename = "mets:fileSec")]
    file_sec: FileSec,
    #[serde(rename = "mets:structMap")]
    struct_map: StructMap,
}

#[derive(Debug, Serialize)]
struct MetsHdr {
    #[serde(rename = "@CREATEDATE")]
    createdate: String,
    #[serde(rename = "mets:agent")]
    agent: MetsAgent,
}

#[derive(Debug, Serialize)]
struct MetsAgent {
    #[serde(rename = "@ROLE")]
    role: String,
    #[serde(rename = "@TYPE")]
    agent_type: String,
    #[serde(rename = "@OTHERTYPE")]
    other_type: String,
    #[serde(rename = "mets:name")]
    name: String,
}

#[derive(Debug, Serialize)]
struct AmdSec {
    #[serde(rename = "@ID")]
    id: String,
    #[serde(rename = "mets:sourceMD")]
    source: SourceMd,
}

#[derive(Debug, Serialize)]
struct SourceMd {
    #[serde(rename = "@ID")]
    id: String,
    #[serde(rename = "mets:mdWrap")]
    wrap: MdWrap,
}

#[derive(Debug, Serialize)]
struct MdWrap {
    #[serde(rename = "@MDTYPE")]
    mdtype: String,
    #[serde(rename = "@OTHERMDTYPE")]
    other_mdtype: String,
    #[serde(rename = "mets:xmlData")]
    data: XmlData,
}

#[derive(Debug, Serialize)]
struct XmlData {
    #[serde(rename = "crawlJob")]
    job: CrawlJobMd,
}

#[derive(Debug, Serialize)]
struct CrawlJobMd {
    #[serde(rename = "@stream")]
    stream: String,
    #[serde(rename = "@launch")]
    launch: String,
}

#[derive(Debug, Serialize)]
struct FileSec {
    #[serde(rename = "mets:fileGrp")]
    groups: Vec<FileGrp>,
}

#[derive(Debug, Serialize)]
struct FileGrp {
    #[serde(rename = "@USE")]
    use_attr: String,
    #[serde(rename = "mets:file")]
    files: Vec<MetsFile>,
}

#[derive(Debug, Serialize)]
struct MetsFile {
    #[serde(rename = "@ID")]
    id: String,
    #[serde(rename = "@MIMETYPE")]
    mimetype: String,
    #[serde(rename = "@SIZE")]
    size: u64,
    #[serde(rename = "@CHECKSUM")]
    checksum: String,
    #[serde(rename = "@CHECKSUMTYPE")]
    checksum_type: String,
    #[serde(rename = "mets:FLocat")]
    locat: FLocat,
}

#[derive(Debug, Serialize)]
struct FLocat {
    #[serde(rename = "@LOCTYPE")]
    loctype: String,
    #[serde(rename = "@xlink:href")]
    href: String,
}

#[derive(Debug, Serialize)]
struct StructMap {
    #[serde(rename = "@TYPE")]
    map_type: String,
    #[serde(rename = "mets:div")]
    div: CrawlDiv,
}

#[derive(Debug, Serialize)]
struct CrawlDiv {
    #[serde(rename = "@TYPE")]
    div_type: String,
    #[serde(rename = "@LABEL")]
    label: String,
    #[serde(rename = "mets:div")]
    children: Vec<StructDiv>,
}

#[derive(Debug, Serialize)]
struct StructDiv {
    #[serde(rename = "@TYPE")]
    div_type: String,
    #[serde(rename = "mets:fptr")]
    fptrs: Vec<Fptr>,
}

#[derive(Debug, Serialize)]
struct Fptr {
    #[serde(rename = "@FILEID")]
    file_id: String,
}
