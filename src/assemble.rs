use crate::models::ReleaseInfo;

/// Concatenate record batches (pages or providers) and order them newest first.
pub fn assemble<I>(batches: I) -> Vec<ReleaseInfo>
where
    I: IntoIterator<Item = Vec<ReleaseInfo>>,
{
    let mut records: Vec<ReleaseInfo> = batches.into_iter().flatten().collect();
    sort_by_publish_date(&mut records);
    records
}

/// Stable sort, newest first; records without a publish date go last.
pub fn sort_by_publish_date(records: &mut [ReleaseInfo]) {
    records.sort_by(|a, b| b.publish_date.cmp(&a.publish_date));
}
