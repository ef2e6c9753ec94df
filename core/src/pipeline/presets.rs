// callflow/src/pipeline/presets.rs

//! Built-in pipeline definitions.

use crate::core::sample::ReadLayout;
use crate::core::stage::StageDef;
use crate::core::template::{arg, args, flagged, spread};
use crate::merge::CohortMergeDef;
use crate::pipeline::definition::PipelineDefinition;
use std::fmt;
use std::str::FromStr;

pub const PEPPER_IMAGE: &str = "kishwars/pepper_deepvariant:r0.7";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelinePreset {
  /// Nanopore reads: align, sort, index, call variants per sample, then merge
  /// the per-sample gVCFs into a cohort callset.
  #[default]
  OntVariants,
  /// Paired-end short reads: trim, assemble, map back and run QC. No merge.
  ShortReadAssembly,
}

impl PipelinePreset {
  pub const ALL: [PipelinePreset; 2] = [PipelinePreset::OntVariants, PipelinePreset::ShortReadAssembly];

  pub fn name(self) -> &'static str {
    match self {
      PipelinePreset::OntVariants => "ont-variants",
      PipelinePreset::ShortReadAssembly => "short-read-assembly",
    }
  }

  pub fn definition(self) -> PipelineDefinition {
    match self {
      PipelinePreset::OntVariants => ont_variants(),
      PipelinePreset::ShortReadAssembly => short_read_assembly(),
    }
  }
}

impl fmt::Display for PipelinePreset {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for PipelinePreset {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::ALL
      .into_iter()
      .find(|p| p.name() == s)
      .ok_or_else(|| format!("unknown pipeline preset '{s}'"))
  }
}

pub fn ont_variants() -> PipelineDefinition {
  let align = StageDef::new("align", "minimap2")
    .args(args(["-x", "map-ont", "-a", "-t", "{threads}", "{reference}"]))
    .args([spread("reads")])
    .requires("{reference}")
    .pipe_to_next();

  let sort = StageDef::new("sort", "samtools")
    .args(args(["sort", "-o", "{bam}", "-@", "{threads}"]))
    .from_pipe()
    .produces("{bam}");

  let index = StageDef::new("index", "samtools")
    .args(args(["index", "{bam}"]))
    .requires("{bam}")
    .produces("{bai}");

  // The caller runs in a container, so every path is given relative to a mount.
  let call = StageDef::new("call", "docker")
    .args(args([
      "run",
      "--rm",
      "-v",
      "{reference_dir}:/ref",
      "-v",
      "{bam_dir}:/bam",
      "-v",
      "{gvcf_dir}:/output",
      PEPPER_IMAGE,
      "run_pepper_margin_deepvariant",
      "call_variant",
      "-b",
      "/bam/{bam_name}",
      "-f",
      "/ref/{reference_name}",
      "-o",
      "/output/",
      "-p",
      "{sample}",
      "-t",
      "{threads}",
      "--ont_r9_guppy5_sup",
      "--gvcf",
    ]))
    .requires("{bam}")
    .requires("{bai}")
    .produces("{gvcf}");

  let pull = StageDef::new("pull_caller_image", "docker").args(args(["pull", PEPPER_IMAGE]));

  let merge = CohortMergeDef {
    input_artifact: "gvcf".to_string(),
    intermediate: "{cohort}.g.vcf".to_string(),
    final_output: "{cohort}.vcf".to_string(),
    prepare: Some(
      StageDef::new("sequence_dictionary", "gatk")
        .args(args(["CreateSequenceDictionary", "-R", "{reference}"]))
        .skip_if_present("{reference_dict}")
        .produces("{reference_dict}"),
    ),
    combine: StageDef::new("combine_gvcfs", "gatk")
      .args([arg("CombineGVCFs"), flagged("-V", "inputs")])
      .args(args(["-R", "{reference}", "-O", "{intermediate}"]))
      .produces("{intermediate}"),
    convert: StageDef::new("gvcf_to_vcf", "bcftools")
      .args(args(["convert", "--gvcf2vcf", "{intermediate}", "-f", "{reference}", "-o", "{final}"]))
      .produces("{final}"),
  };

  PipelineDefinition::new("ont-variants", ReadLayout::SingleEnd, vec![align, sort, index, call])
    .with_artifact("bam", "bam/{sample}.bam")
    .with_artifact("bai", "{bam}.bai")
    .with_artifact("gvcf", "pepper/{sample}/{sample}.g.vcf.gz")
    .with_artifact("vcf", "pepper/{sample}/{sample}.vcf.gz")
    .with_prepare(pull)
    .with_merge(merge)
}

pub fn short_read_assembly() -> PipelineDefinition {
  let trim = StageDef::new("trim", "fastp")
    .args(args([
      "--thread",
      "{threads}",
      "-i",
      "{read1}",
      "-I",
      "{read2}",
      "-o",
      "{trimmed1}",
      "-O",
      "{trimmed2}",
      "-j",
      "{fastp_report}",
      "-h",
      "{fastp_html}",
    ]))
    .produces("{trimmed1}")
    .produces("{trimmed2}");

  let assemble = StageDef::new("assemble", "skesa")
    .args(args([
      "--fastq",
      "{trimmed1},{trimmed2}",
      "--contigs_out",
      "{contigs}",
      "--cores",
      "{threads}",
    ]))
    .requires("{trimmed1}")
    .requires("{trimmed2}")
    .produces("{contigs}");

  let index = StageDef::new("index_contigs", "bwa")
    .args(args(["index", "{contigs}"]))
    .requires("{contigs}")
    .produces("{contigs}.bwt");

  let map = StageDef::new("map_reads", "bwa")
    .args(args(["mem", "-t", "{threads}", "-M", "{contigs}", "{read1}", "{read2}"]))
    .requires("{contigs}.bwt")
    .pipe_to_next();

  let sort = StageDef::new("sort", "samtools")
    .args(args(["sort", "-o", "{bam}", "-@", "{threads}"]))
    .from_pipe()
    .produces("{bam}");

  let qc = StageDef::new("qc", "qualimap")
    .args(args(["bamqc", "-bam", "{bam}", "-outdir", "{qualimap}", "-nt", "{threads}"]))
    .requires("{bam}")
    .produces("{qualimap}");

  PipelineDefinition::new(
    "short-read-assembly",
    ReadLayout::PairedEnd,
    vec![trim, assemble, index, map, sort, qc],
  )
  .with_artifact("trimmed1", "assembly/{sample}/{sample}_t1.fq.gz")
  .with_artifact("trimmed2", "assembly/{sample}/{sample}_t2.fq.gz")
  .with_artifact("fastp_report", "assembly/{sample}/{sample}.fastp.json")
  .with_artifact("fastp_html", "assembly/{sample}/{sample}.fastp.html")
  .with_artifact("contigs", "assembly/{sample}/{sample}.skesa.fa")
  .with_artifact("bam", "assembly/{sample}/{sample}.bam")
  .with_artifact("qualimap", "assembly/{sample}/{sample}_qualimap")
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn presets_are_valid() {
    for preset in PipelinePreset::ALL {
      preset.definition().validate().unwrap();
    }
  }

  #[test]
  fn preset_names_round_trip() {
    for preset in PipelinePreset::ALL {
      assert_eq!(preset.name().parse::<PipelinePreset>().unwrap(), preset);
    }
    assert!("wgs".parse::<PipelinePreset>().is_err());
  }

  #[test]
  fn ont_align_pipes_into_sort() {
    let def = ont_variants();
    assert_eq!(def.chains(), vec![0..2, 2..3, 3..4]);
    assert_eq!(def.stage_names(), vec!["align", "sort", "index", "call"]);
  }
}
