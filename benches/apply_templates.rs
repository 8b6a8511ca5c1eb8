//! Template application benchmarks
//!
//! Measures a full transformation (rule resolution, frame handling, serialization) over
//! growing source documents, and keyed lookups against a shared document.
//!
//! Run benchmarks: `cargo bench --bench apply_templates`

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use weft::{Stylesheet, TransformOptions};

const RULES: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output omit-xml-declaration="yes"/>
  <xsl:template match="/"><table><xsl:apply-templates select="records/record"/></table></xsl:template>
  <xsl:template match="record"><tr><xsl:apply-templates select="@*|*"/></tr></xsl:template>
  <xsl:template match="record[@flag = 'x']" priority="1"><tr class="flagged"><xsl:apply-templates/></tr></xsl:template>
  <xsl:template match="@id"><td><xsl:value-of select="."/></td></xsl:template>
  <xsl:template match="name|value"><td><xsl:value-of select="."/></td></xsl:template>
  <xsl:template match="*"/>
</xsl:stylesheet>"#;

const KEYED: &str = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:output method="text"/>
  <xsl:key name="by-group" match="record" use="@group"/>
  <xsl:template match="/"><xsl:for-each select="records/record[@id mod 50 = 0]"><xsl:value-of select="count(key('by-group', @group))"/>,</xsl:for-each></xsl:template>
</xsl:stylesheet>"#;

/// Generate a source document with `count` records
fn generate_records(count: usize) -> String {
    let mut xml = String::from("<records>");
    for i in 0..count {
        let flag = if i % 7 == 0 { "x" } else { "-" };
        xml.push_str(&format!(
            r#"<record id="{}" group="g{}" flag="{}"><name>Record {}</name><value>{}</value><note/></record>"#,
            i,
            i % 10,
            flag,
            i,
            i * 100
        ));
    }
    xml.push_str("</records>");
    xml
}

fn bench_apply_templates(c: &mut Criterion) {
    let stylesheet = Stylesheet::compile(RULES).expect("benchmark stylesheet compiles");
    let options = TransformOptions::default();
    let mut group = c.benchmark_group("apply_templates");
    for count in [10usize, 100, 1000] {
        let source = stylesheet
            .parse_source(&generate_records(count))
            .expect("benchmark source parses");
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &source, |b, source| {
            b.iter(|| {
                let output = stylesheet
                    .transform_document(black_box(source), &options)
                    .expect("transform succeeds");
                black_box(output.output.len())
            })
        });
    }
    group.finish();
}

fn bench_key_lookup(c: &mut Criterion) {
    let stylesheet = Stylesheet::compile(KEYED).expect("benchmark stylesheet compiles");
    let options = TransformOptions::default();
    let mut group = c.benchmark_group("key_lookup");
    for count in [100usize, 1000] {
        let text = generate_records(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("fresh_index", count), &text, |b, text| {
            b.iter(|| {
                let output = stylesheet
                    .transform(black_box(text), &options)
                    .expect("transform succeeds");
                black_box(output.output.len())
            })
        });
        let shared = stylesheet.parse_source(&text).expect("benchmark source parses");
        group.bench_with_input(BenchmarkId::new("shared_index", count), &shared, |b, source| {
            b.iter(|| {
                let output = stylesheet
                    .transform_document(black_box(source), &options)
                    .expect("transform succeeds");
                black_box(output.output.len())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_apply_templates, bench_key_lookup);
criterion_main!(benches);
