use crate::errors::Result;
use crate::storage::models::{
    ClickEvent, Conversion, FraudDetails, FraudRecord, FraudRule, GeoInfo, Payout, ReferralLink,
    TrackingCookie, parse_stored,
};
use migration::entities::{
    click_event, conversion, fraud_record, fraud_rule, payout, referral_link, tracking_cookie,
};

/// 将 Sea-ORM Model 转换为 ReferralLink
pub fn model_to_link(model: referral_link::Model) -> Result<ReferralLink> {
    Ok(ReferralLink {
        reward_type: parse_stored("reward_type", &model.reward_type)?,
        id: model.id,
        referrer_id: model.referrer_id,
        product_id: model.product_id,
        shop_id: model.shop_id,
        code: model.code,
        short_code: model.short_code,
        reward_value: model.reward_value,
        override_tier_rate: model.override_tier_rate,
        target_url: model.target_url,
        active: model.active,
        click_count: model.click_count.max(0) as u64,
        created_at: model.created_at,
        expires_at: model.expires_at,
        revoked_at: model.revoked_at,
    })
}

/// 新建链接的 ActiveModel（code 创建后不可变，只在插入时使用）
pub fn link_to_active_model(link: &ReferralLink) -> referral_link::ActiveModel {
    use sea_orm::ActiveValue::*;

    referral_link::ActiveModel {
        id: Set(link.id.clone()),
        referrer_id: Set(link.referrer_id.clone()),
        product_id: Set(link.product_id.clone()),
        shop_id: Set(link.shop_id.clone()),
        code: Set(link.code.clone()),
        short_code: Set(link.short_code.clone()),
        reward_type: Set(link.reward_type.as_ref().to_string()),
        reward_value: Set(link.reward_value),
        override_tier_rate: Set(link.override_tier_rate),
        target_url: Set(link.target_url.clone()),
        active: Set(link.active),
        click_count: Set(link.click_count as i64),
        created_at: Set(link.created_at),
        expires_at: Set(link.expires_at),
        revoked_at: Set(link.revoked_at),
    }
}

pub fn model_to_click(model: click_event::Model) -> ClickEvent {
    ClickEvent {
        id: model.id,
        referral_id: model.referral_id,
        referral_code: model.referral_code,
        visitor_ip: model.visitor_ip,
        user_agent: model.user_agent,
        user_agent_hash: model.user_agent_hash,
        fingerprint: model.fingerprint,
        referrer_url: model.referrer_url,
        landing_page: model.landing_page,
        geo: GeoInfo {
            country: model.country,
            city: model.city,
        },
        clicked_at: model.clicked_at,
    }
}

pub fn click_to_active_model(click: &ClickEvent) -> click_event::ActiveModel {
    use sea_orm::ActiveValue::*;

    click_event::ActiveModel {
        id: Set(click.id.clone()),
        referral_id: Set(click.referral_id.clone()),
        referral_code: Set(click.referral_code.clone()),
        visitor_ip: Set(click.visitor_ip.clone()),
        user_agent: Set(click.user_agent.clone()),
        user_agent_hash: Set(click.user_agent_hash.clone()),
        fingerprint: Set(click.fingerprint.clone()),
        referrer_url: Set(click.referrer_url.clone()),
        landing_page: Set(click.landing_page.clone()),
        country: Set(click.geo.country.clone()),
        city: Set(click.geo.city.clone()),
        clicked_at: Set(click.clicked_at),
    }
}

pub fn model_to_cookie(model: tracking_cookie::Model) -> TrackingCookie {
    TrackingCookie {
        cookie_value: model.cookie_value,
        referral_id: model.referral_id,
        referral_code: model.referral_code,
        click_id: model.click_id,
        fingerprint: model.fingerprint,
        created_at: model.created_at,
        expires_at: model.expires_at,
        converted_at: model.converted_at,
    }
}

pub fn cookie_to_active_model(cookie: &TrackingCookie) -> tracking_cookie::ActiveModel {
    use sea_orm::ActiveValue::*;

    tracking_cookie::ActiveModel {
        cookie_value: Set(cookie.cookie_value.clone()),
        referral_id: Set(cookie.referral_id.clone()),
        referral_code: Set(cookie.referral_code.clone()),
        click_id: Set(cookie.click_id.clone()),
        fingerprint: Set(cookie.fingerprint.clone()),
        created_at: Set(cookie.created_at),
        expires_at: Set(cookie.expires_at),
        converted_at: Set(cookie.converted_at),
    }
}

pub fn model_to_conversion(model: conversion::Model) -> Conversion {
    Conversion {
        id: model.id,
        referral_id: model.referral_id,
        referrer_id: model.referrer_id,
        purchase_id: model.purchase_id,
        click_id: model.click_id,
        purchase_amount: model.purchase_amount,
        commission_amount: model.commission_amount,
        currency: model.currency,
        fraud_score: model.fraud_score,
        is_verified: model.is_verified,
        tier_level: model.tier_level,
        visitor_ip: model.visitor_ip,
        user_agent_hash: model.user_agent_hash,
        payout_id: model.payout_id,
        created_at: model.created_at,
    }
}

pub fn conversion_to_active_model(conv: &Conversion) -> conversion::ActiveModel {
    use sea_orm::ActiveValue::*;

    conversion::ActiveModel {
        id: Set(conv.id.clone()),
        referral_id: Set(conv.referral_id.clone()),
        referrer_id: Set(conv.referrer_id.clone()),
        purchase_id: Set(conv.purchase_id.clone()),
        click_id: Set(conv.click_id.clone()),
        purchase_amount: Set(conv.purchase_amount),
        commission_amount: Set(conv.commission_amount),
        currency: Set(conv.currency.clone()),
        fraud_score: Set(conv.fraud_score),
        is_verified: Set(conv.is_verified),
        tier_level: Set(conv.tier_level),
        visitor_ip: Set(conv.visitor_ip.clone()),
        user_agent_hash: Set(conv.user_agent_hash.clone()),
        payout_id: Set(conv.payout_id.clone()),
        created_at: Set(conv.created_at),
    }
}

/// details 列在读取时校验，未知的 type 标签视为数据损坏
pub fn model_to_fraud_record(model: fraud_record::Model) -> Result<FraudRecord> {
    Ok(FraudRecord {
        fraud_type: parse_stored("fraud_type", &model.fraud_type)?,
        status: parse_stored("status", &model.status)?,
        details: FraudDetails::decode_all(&model.details)?,
        id: model.id,
        referral_id: model.referral_id,
        conversion_id: model.conversion_id,
        click_id: model.click_id,
        risk_score: model.risk_score,
        flagged: model.flagged,
        created_at: model.created_at,
        reviewed_at: model.reviewed_at,
    })
}

pub fn fraud_record_to_active_model(record: &FraudRecord) -> Result<fraud_record::ActiveModel> {
    use sea_orm::ActiveValue::*;

    Ok(fraud_record::ActiveModel {
        id: Set(record.id.clone()),
        referral_id: Set(record.referral_id.clone()),
        conversion_id: Set(record.conversion_id.clone()),
        click_id: Set(record.click_id.clone()),
        fraud_type: Set(record.fraud_type.as_ref().to_string()),
        risk_score: Set(record.risk_score.clamp(0.0, 1.0)),
        details: Set(FraudDetails::encode_all(&record.details)?),
        flagged: Set(record.flagged),
        status: Set(record.status.as_ref().to_string()),
        created_at: Set(record.created_at),
        reviewed_at: Set(record.reviewed_at),
    })
}

pub fn model_to_fraud_rule(model: fraud_rule::Model) -> FraudRule {
    FraudRule {
        rule_type: model.rule_type,
        threshold: model.threshold,
        weight: model.weight,
        active: model.active,
    }
}

pub fn model_to_payout(model: payout::Model) -> Result<Payout> {
    Ok(Payout {
        status: parse_stored("status", &model.status)?,
        id: model.id,
        referrer_id: model.referrer_id,
        amount: model.amount,
        currency: model.currency,
        conversion_count: model.conversion_count.max(0) as u32,
        method: model.method,
        period_start: model.period_start,
        period_end: model.period_end,
        external_transaction_id: model.external_transaction_id,
        failure_reason: model.failure_reason,
        created_at: model.created_at,
        updated_at: model.updated_at,
        processed_at: model.processed_at,
    })
}
