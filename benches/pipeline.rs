use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use subway_congestion::PipelineConfig;
use subway_congestion::pipeline::Pipeline;
use subway_congestion::query::CongestionQuery;
use subway_congestion::reader::parse_csv_text;

const DAY_TYPES: [&str; 3] = ["평일", "토요일", "일요일"];
const DIRECTIONS: [&str; 2] = ["상선", "하선"];

/// Synthetic export with `rows` data rows and the full 39-slot schedule
fn synthetic_export(rows: usize) -> String {
    let mut text = String::from("요일구분,호선,역번호,출발역,상하구분,5시30분");
    for hour in 6..24 {
        text.push_str(&format!(",{}시00분,{}시30분", hour, hour));
    }
    text.push_str(",0시00분,0시30분\n");

    for row in 0..rows {
        let line = row % 9 + 1;
        let station = row / 6;
        text.push_str(&format!(
            "{},{}호선,{},역{},{}",
            DAY_TYPES[row % 3],
            line,
            line * 100 + station % 100,
            station,
            DIRECTIONS[(row / 3) % 2]
        ));
        for slot in 0..39 {
            let value = ((row * 31 + slot * 17) % 1700) as f64 / 10.0;
            text.push_str(&format!(",{:.1}", value));
        }
        text.push('\n');
    }
    text
}

fn bench_pipeline(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);

    for rows in [200usize, 2_000] {
        let text = synthetic_export(rows);
        group.bench_with_input(BenchmarkId::new("run_table", rows), &text, |b, text| {
            b.iter(|| {
                let raw = parse_csv_text(text, &config.input).unwrap();
                let output = Pipeline::new(config.clone()).unwrap().run_table(raw).unwrap();
                black_box(output.table.len())
            })
        });
    }
    group.finish();
}

fn bench_queries(c: &mut Criterion) {
    let config = PipelineConfig::default();
    let raw = parse_csv_text(&synthetic_export(2_000), &config.input).unwrap();
    let table = Pipeline::new(config).unwrap().run_table(raw).unwrap().table;
    let query = CongestionQuery::from_table(&table).unwrap();

    c.bench_function("query/top_stations", |b| {
        b.iter(|| black_box(query.top_stations(10, false).unwrap()))
    });
    c.bench_function("query/congestion_by_time", |b| {
        b.iter(|| black_box(query.congestion_by_time(true).unwrap()))
    });
}

criterion_group!(benches, bench_pipeline, bench_queries);
criterion_main!(benches);
