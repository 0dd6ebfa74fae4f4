pub const INDEX_HTML: &str = r##"<!DOCTYPE html>
<html lang="zh-Hant">
<head>
<meta charset="utf-8">
<title>AI 新聞編輯台</title>
<style>
  body { font-family: system-ui, sans-serif; margin: 2rem; max-width: 1100px; }
  section { margin-bottom: 1.5rem; }
  button { margin-right: .5rem; }
  table { border-collapse: collapse; width: 100%; font-size: .9rem; }
  th, td { border: 1px solid #ccc; padding: .3rem .5rem; text-align: left; }
  #logs { background: #111; color: #ddd; padding: .5rem; height: 12rem; overflow-y: auto; font-size: .8rem; }
  textarea { width: 100%; height: 6rem; }
  input[type=number] { width: 4rem; }
</style>
</head>
<body>
<h1>AI 新聞編輯台</h1>

<section>
  <button onclick="post('/api/start_stage1')">第一階段：收集與評分</button>
  <button onclick="post('/api/start_stage2')">第二階段：產生格式</button>
  <span id="stage"></span> <progress id="progress" max="100" value="0"></progress>
  <span id="step"></span>
</section>

<section>
  <h2>權重</h2>
  技術 <input type="number" id="w-tech">
  影響 <input type="number" id="w-impact">
  實戰 <input type="number" id="w-practical">
  時效 <input type="number" id="w-timely">
  <button onclick="saveWeights()">更新權重</button>
</section>

<section>
  <h2>指令</h2>
  <textarea id="commands" placeholder="#選擇 1 3 5&#10;#過濾 類別=研究突破&#10;#合併 3 8&#10;#補證據 4&#10;#改分類 6=企業應用&#10;#重搜 關鍵詞A, 關鍵詞B"></textarea>
  <button onclick="sendCommands()">送出指令</button>
  <pre id="command-results"></pre>
</section>

<section>
  <h2>候選新聞</h2>
  <table>
    <thead><tr><th>#</th><th>類別</th><th>標題</th><th>重點</th><th>總分</th><th>來源</th></tr></thead>
    <tbody id="candidates"></tbody>
  </table>
</section>

<section>
  <h2>下載</h2>
  <a href="/api/download/format_a">格式 A</a> ·
  <a href="/api/download/format_b">格式 B</a> ·
  <a href="/api/download/format_c">格式 C</a> ·
  <a href="/api/download/full">完整結果</a>
</section>

<section>
  <h2>日誌</h2>
  <div id="logs"></div>
</section>

<script>
async function post(url, body) {
  const res = await fetch(url, {
    method: 'POST',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(body || {}),
  });
  const data = await res.json();
  if (!res.ok) alert(data.error || res.statusText);
  refresh();
  return data;
}

async function sendCommands() {
  const commands = document.getElementById('commands').value.split('\n');
  const data = await post('/api/process_commands', { commands });
  if (data.results) {
    document.getElementById('command-results').textContent =
      data.results.map(r => (r.ok ? '✓ ' : '✗ ') + r.command + ' → ' + r.message).join('\n');
  }
}

async function saveWeights() {
  const v = id => parseInt(document.getElementById(id).value, 10) || 0;
  await post('/api/update_weights', { weights: {
    tech: v('w-tech'), impact: v('w-impact'), practical: v('w-practical'), timely: v('w-timely'),
  }});
}

function escapeHtml(s) {
  return String(s).replace(/[&<>"]/g, c => ({ '&': '&amp;', '<': '&lt;', '>': '&gt;', '"': '&quot;' }[c]));
}

async function refresh() {
  const status = await (await fetch('/api/status')).json();
  document.getElementById('stage').textContent = status.stage;
  document.getElementById('progress').value = status.progress;
  document.getElementById('step').textContent = status.current_step;
  document.getElementById('logs').textContent = status.logs.join('\n');
  for (const k of ['tech', 'impact', 'practical', 'timely']) {
    const el = document.getElementById('w-' + k);
    if (document.activeElement !== el) el.value = status.weights[k];
  }

  const candidates = await (await fetch('/api/candidates')).json();
  document.getElementById('candidates').innerHTML = candidates.map(c =>
    `<tr><td>${c.id}</td><td>${escapeHtml(c.category)}</td>` +
    `<td><a href="${escapeHtml(c.url)}" target="_blank">${escapeHtml(c.title)}</a></td>` +
    `<td>${escapeHtml(c.key_point)}</td><td>${c.total_score}</td><td>${escapeHtml(c.source)}</td></tr>`
  ).join('');
}

refresh();
setInterval(refresh, 3000);
</script>
</body>
</html>
"##;
