use std::path::Path;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};
use wwvb::{
    calendar::CalendarTime,
    classify::BitClassifier,
    decode::{self, DecodedTime, DstState},
    dst, frame,
    sync::{self, MinuteContext},
    Config,
};

use crate::{capture, Format};

#[derive(Serialize)]
struct MinuteReport {
    utc: String,
    year: u16,
    month: u8,
    day: u8,
    weekday: u8,
    hour: u8,
    minute: u8,
    day_of_year: u16,
    dut_tenths: i32,
    leap_year: bool,
    leap_second_pending: bool,
    dst: DstState,
    quality: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    local: Option<String>,
}

fn timestamp(time: &CalendarTime) -> String {
    NaiveDate::from_ymd_opt(i32::from(time.year), u32::from(time.month), u32::from(time.day))
        .and_then(|date| {
            date.and_hms_opt(
                u32::from(time.hour),
                u32::from(time.minute),
                u32::from(time.second),
            )
        })
        .map_or_else(
            || "invalid".to_string(),
            |stamp| stamp.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        )
}

fn report(decoded: &DecodedTime, quality: u8, gmt_hours: Option<i8>) -> Option<MinuteReport> {
    let utc = decoded.to_calendar()?;
    let local = gmt_hours.map(|hours| {
        let local = dst::local_calendar(&utc, hours, decoded.dst);
        timestamp(&local)
    });

    Some(MinuteReport {
        utc: timestamp(&utc),
        year: utc.year,
        month: utc.month,
        day: utc.day,
        weekday: utc.weekday,
        hour: utc.hour,
        minute: utc.minute,
        day_of_year: decoded.day_of_year,
        dut_tenths: decoded.dut_signed_tenths(),
        leap_year: decoded.leap_year,
        leap_second_pending: decoded.leap_second_pending,
        dst: decoded.dst,
        quality,
        local,
    })
}

fn render(report: &MinuteReport) -> String {
    let sign = if report.dut_tenths < 0 { '-' } else { '+' };
    let mut line = format!(
        "{} doy={} dut={}0.{}s dst={:?} quality={}",
        report.utc,
        report.day_of_year,
        sign,
        report.dut_tenths.abs(),
        report.dst,
        report.quality,
    );
    if let Some(local) = &report.local {
        line.push_str(&format!(" local={local}"));
    }
    line
}

pub fn run(input: &Path, format: Format, gmt_hours: Option<i8>) -> Result<()> {
    let pulses = capture::read_pulses(input)?;
    info!("read {} pulses", pulses.len());

    let config = Config::default();
    let mut bits = BitClassifier::new(pulses.into_iter(), config.clone());
    let snr = bits.snr();
    let mut ctx = MinuteContext::default();
    let mut reports = Vec::new();

    while let Some(minute_start) = sync::acquire(&mut bits, &ctx) {
        ctx.leap_second = false;
        let raw = match frame::collect_frame(&mut bits, minute_start, &config) {
            Ok(raw) => raw,
            Err(defect) => {
                warn!(%defect, "frame abandoned");
                continue;
            }
        };
        match decode::decode(&raw) {
            Ok(decoded) => {
                ctx = MinuteContext::after_decode(&decoded);
                let quality = snr.lock().expect("snr window poisoned").quality();
                if let Some(report) = report(&decoded, quality, gmt_hours) {
                    reports.push(report);
                }
            }
            Err(defect) => warn!(%defect, "frame rejected"),
        }
    }

    if reports.is_empty() {
        warn!("no complete minutes in capture");
    }

    match format {
        Format::Text => {
            for report in &reports {
                println!("{}", render(report));
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }

    Ok(())
}
