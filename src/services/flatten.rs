//! 扁平化投影 - 业务能力层
//!
//! 把两路 API 响应压成一条可检索的扁平记录。
//! 纯函数，无状态，不做网络和存储。
//!
//! 上游 JSON 的字段经常缺失或换形状，所以所有取值都是
//! "按路径挖 + 取第一个可用值"的尽力而为风格。

use chrono::Utc;
use serde_json::{json, Map, Value as JsonValue};

use crate::models::RawPayload;

/// 存储文档里最多保留的图片数
const MAX_IMAGES: usize = 30;

/// 按点分路径取嵌套值，支持对象键和数组下标
fn dig<'a>(obj: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut cur = obj;
    for key in path.split('.') {
        cur = match cur {
            JsonValue::Object(map) => map.get(key)?,
            JsonValue::Array(arr) => {
                let idx: usize = key.parse().ok()?;
                arr.get(idx)?
            }
            _ => return None,
        };
        if cur.is_null() {
            return None;
        }
    }
    Some(cur)
}

/// 取第一个非空字符串（去除首尾空白）
fn first_str(candidates: &[Option<&JsonValue>]) -> Option<String> {
    for v in candidates.iter().flatten() {
        if let Some(s) = v.as_str() {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// 取第一个能当数字用的值
///
/// 字符串先过滤出数字和小数点再解析，
/// 这样 "123,456 ريال" 这类带格式的价格也能取到数。
fn first_num(candidates: &[Option<&JsonValue>]) -> Option<JsonValue> {
    for v in candidates.iter().flatten() {
        if v.is_number() {
            return Some((*v).clone());
        }
        if let Some(s) = v.as_str() {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            if digits.is_empty() {
                continue;
            }
            if digits.contains('.') {
                if let Ok(f) = digits.parse::<f64>() {
                    return Some(json!(f));
                }
            } else if let Ok(n) = digits.parse::<i64>() {
                return Some(json!(n));
            }
        }
    }
    None
}

fn opt(v: Option<JsonValue>) -> JsonValue {
    v.unwrap_or(JsonValue::Null)
}

fn opt_str(v: Option<String>) -> JsonValue {
    v.map(JsonValue::String).unwrap_or(JsonValue::Null)
}

/// 把两路 API 响应的 JSON 扁平化成业务字段
pub fn flatten_post(inspection_json: &JsonValue, details_json: &JsonValue) -> Map<String, JsonValue> {
    let empty = json!({});
    let ins_data = dig(inspection_json, "data.inspection").unwrap_or(&empty);
    let det_data = dig(details_json, "data").unwrap_or(&empty);
    let details_card = dig(det_data, "details.details_card").unwrap_or(&empty);
    let price_data = dig(det_data, "price").unwrap_or(&empty);

    let mut flat = Map::new();

    // ========== 基本信息 ==========
    flat.insert(
        "post_id".into(),
        opt(first_num(&[dig(det_data, "details.id")])),
    );
    flat.insert(
        "title".into(),
        opt_str(first_str(&[
            dig(det_data, "details.title"),
            dig(det_data, "meta.title"),
        ])),
    );

    // ========== 车辆参数 ==========
    flat.insert(
        "brand".into(),
        opt_str(first_str(&[
            dig(details_card, "make.name"),
            dig(details_card, "make.altName"),
        ])),
    );
    flat.insert(
        "model".into(),
        opt_str(first_str(&[
            dig(details_card, "model.name"),
            dig(details_card, "model.altName"),
        ])),
    );
    flat.insert(
        "trim".into(),
        opt_str(first_str(&[
            dig(details_card, "extension.name"),
            dig(details_card, "extension.altName"),
        ])),
    );
    flat.insert(
        "year".into(),
        opt(first_num(&[
            dig(details_card, "years.id"),
            dig(details_card, "years.name"),
        ])),
    );
    flat.insert(
        "mileage_km".into(),
        opt(first_num(&[
            dig(details_card, "milage.id"),
            dig(details_card, "milage.name"),
        ])),
    );

    // ========== 地区与来源 ==========
    flat.insert(
        "city".into(),
        opt_str(first_str(&[dig(det_data, "g4Data.post_city")])),
    );
    flat.insert(
        "origin".into(),
        opt_str(first_str(&[dig(details_card, "car_origin.name")])),
    );

    // ========== 机械参数 ==========
    flat.insert(
        "fuel_type".into(),
        opt_str(first_str(&[
            dig(details_card, "fuel_types.name"),
            dig(det_data, "fuel.fuel_type"),
        ])),
    );
    flat.insert(
        "transmission".into(),
        opt_str(first_str(&[dig(details_card, "transmission_type.name")])),
    );
    flat.insert(
        "engine_size".into(),
        opt_str(first_str(&[dig(details_card, "engine_size.name")])),
    );
    flat.insert(
        "cylinders".into(),
        opt(first_num(&[
            dig(details_card, "cylinders.id"),
            dig(details_card, "cylinders.name"),
        ])),
    );
    flat.insert(
        "horse_power".into(),
        opt(first_num(&[
            dig(details_card, "horse_power.id"),
            dig(details_card, "horse_power.name"),
        ])),
    );
    flat.insert(
        "drivetrain".into(),
        opt_str(first_str(&[dig(details_card, "drivetrain_type.name")])),
    );
    flat.insert(
        "engine_type".into(),
        opt_str(first_str(&[dig(details_card, "engine_type.name")])),
    );
    flat.insert(
        "fuel_tank_liters".into(),
        opt(first_num(&[
            dig(details_card, "fuel_tank.id"),
            dig(details_card, "fuel_tank.name"),
        ])),
    );
    flat.insert(
        "fuel_economy_kml".into(),
        opt(first_num(&[dig(det_data, "fuel.fuel_economy")])),
    );
    flat.insert(
        "seats".into(),
        opt(first_num(&[
            dig(details_card, "seats.id"),
            dig(details_card, "seats.name"),
        ])),
    );

    // ========== 价格 ==========
    flat.insert(
        "price_cash".into(),
        opt(first_num(&[
            dig(price_data, "vat_price.text"),
            dig(det_data, "analytics.price"),
        ])),
    );
    flat.insert(
        "price_monthly".into(),
        opt(first_num(&[dig(price_data, "finance_price.text")])),
    );

    // ========== 检测报告 ==========
    flat.insert(
        "chassis_number".into(),
        opt_str(first_str(&[dig(ins_data, "chassis_number")])),
    );
    flat.insert(
        "plate_number".into(),
        opt_str(first_str(&[dig(ins_data, "plate_number")])),
    );

    // ========== 车身状况 ==========
    let body_is_clear = dig(ins_data, "external_body.sub.0.body_is_clear")
        .and_then(|v| v.as_i64())
        .map(|v| v == 1)
        .unwrap_or(false);
    flat.insert("body_is_clear".into(), json!(body_is_clear));

    // ========== 图片 ==========
    let (images, featured) = collect_images(det_data);
    flat.insert(
        "featured_image".into(),
        opt_str(featured.or_else(|| images.first().cloned())),
    );
    flat.insert("images".into(), json!(images));

    // ========== 列表信息 ==========
    flat.insert(
        "share_link".into(),
        opt_str(first_str(&[dig(det_data, "details.share_link")])),
    );
    flat.insert("tags".into(), json!(collect_tags(det_data)));

    flat
}

/// 收集图片地址：去重保序，最多 MAX_IMAGES 张，顺带找出主图
fn collect_images(det_data: &JsonValue) -> (Vec<String>, Option<String>) {
    let mut images = Vec::new();
    let mut featured = None;

    if let Some(gallery) = dig(det_data, "gallery.images").and_then(|v| v.as_array()) {
        for img in gallery {
            let Some(url) = img.get("img_url").and_then(|v| v.as_str()) else {
                continue;
            };
            if url.is_empty() {
                continue;
            }
            let is_featured = img.get("is_featured").and_then(|v| v.as_i64()) == Some(1);
            if is_featured && featured.is_none() {
                featured = Some(url.to_string());
            }
            if !images.iter().any(|u| u == url) {
                images.push(url.to_string());
            }
        }
    }

    images.truncate(MAX_IMAGES);
    (images, featured)
}

fn collect_tags(det_data: &JsonValue) -> Vec<String> {
    dig(det_data, "details.tags")
        .and_then(|v| v.as_array())
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.get("tag_name").and_then(|v| v.as_str()))
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// 组装最终的存储文档
///
/// 文档头部是 id、抓取时间和两个小状态字段，
/// 后面跟全部扁平化业务字段。状态字段 0 表示没拿到可用响应。
pub fn build_post_document(post_id: i64, payload: &RawPayload) -> JsonValue {
    let empty = json!({});
    let inspection_json = payload.inspection.json.as_ref().unwrap_or(&empty);
    let details_json = payload.details.json.as_ref().unwrap_or(&empty);

    let flat = flatten_post(inspection_json, details_json);

    let mut doc = Map::new();
    doc.insert("id".into(), json!(post_id));
    doc.insert("fetchedAt".into(), json!(Utc::now().to_rfc3339()));
    doc.insert(
        "inspection_status".into(),
        json!(payload.inspection.status as i64),
    );
    doc.insert("details_status".into(), json!(payload.details.status as i64));
    doc.extend(flat);

    JsonValue::Object(doc)
}
